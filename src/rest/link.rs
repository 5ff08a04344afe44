//! RFC 8288 `Link` header parsing, as used for admin API pagination.
//!
//! ```text
//! link-value = "<" URI ">" *( OWS ";" OWS link-param )
//! link-param = token [ "=" ( token | quoted-string ) ]
//! ```
//!
//! One pass over the characters of each header value, no backtracking. Any character the
//! grammar does not allow at that point is an error for the whole call.

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("unexpected character in Link header: expected {expected}, got {found:?} at offset {offset} in {header:?}")]
    UnexpectedChar {
        expected: &'static str,
        found: char,
        offset: usize,
        header: String,
    },
    #[error("Link header ended early: expected {expected} in {header:?}")]
    UnexpectedEnd { expected: &'static str, header: String },
    #[error("Link header value is not visible ASCII")]
    NotText,
}

/// One link-value. Parameters the parser does not know are kept in `extensions`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Link {
    pub target: String,
    pub rel: Option<String>,
    pub type_: Option<String>,
    pub lang: Option<String>,
    pub title: Option<String>,
    pub as_: Option<String>,
    pub media: Option<String>,
    pub sizes: Option<String>,
    pub image_sizes: Option<String>,
    pub image_src_set: Option<String>,
    pub integrity: Option<String>,
    pub referrer_policy: Option<String>,
    pub cross_origin: Option<String>,
    pub prefetch: Option<String>,
    pub blocking: Option<String>,
    pub extensions: Vec<(String, String)>,
}

impl Link {
    /// True if `rel` lists `relation` among its space-separated relation types.
    pub fn has_rel(&self, relation: &str) -> bool {
        self.rel
            .as_deref()
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case(relation)))
    }

    /// Resolve the target against the URL of the response that carried the header.
    pub fn resolve(&self, base: &Url) -> Result<Url, url::ParseError> {
        base.join(&self.target)
    }

    fn set_param(&mut self, name: &str, value: String) {
        let slot = match name.to_ascii_lowercase().as_str() {
            "rel" => &mut self.rel,
            "type" => &mut self.type_,
            "lang" | "hreflang" => &mut self.lang,
            "title" => &mut self.title,
            "as" => &mut self.as_,
            "media" => &mut self.media,
            "sizes" => &mut self.sizes,
            "imagesizes" => &mut self.image_sizes,
            "imagesrcset" => &mut self.image_src_set,
            "integrity" => &mut self.integrity,
            "referrerpolicy" | "refererpolicy" => &mut self.referrer_policy,
            "crossorigin" => &mut self.cross_origin,
            "prefetch" => &mut self.prefetch,
            "blocking" => &mut self.blocking,
            _ => {
                tracing::warn!(param = %name, value = %value, "ignoring unknown Link header param");
                self.extensions.push((name.to_string(), value));
                return;
            }
        };
        *slot = Some(value);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Class {
    Comma,
    Semicolon,
    DoubleQuote,
    Backslash,
    Equals,
    LessThan,
    GreaterThan,
    Word,
    Space,
    Other,
}

fn classify(ch: char) -> Class {
    match ch {
        ',' => Class::Comma,
        ';' => Class::Semicolon,
        '"' => Class::DoubleQuote,
        '\\' => Class::Backslash,
        '=' => Class::Equals,
        '<' => Class::LessThan,
        '>' => Class::GreaterThan,
        '-' | '_' => Class::Word,
        c if c.is_alphanumeric() => Class::Word,
        c if c.is_whitespace() => Class::Space,
        _ => Class::Other,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Initial,
    Url,
    WantParam,
    Semicolon,
    ParamName,
    Equal,
    ValueUnquoted,
    ValueQuoted,
    ValueQuotedEscape,
}

/// Parse every occurrence of the header, in order, concatenating the links found.
pub fn parse_link_headers<'a, I>(values: I) -> Result<Vec<Link>, LinkError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = Vec::new();
    for value in values {
        parse_into(value, &mut out)?;
    }
    Ok(out)
}

/// Parse the `Link` headers of an HTTP response.
pub fn links_from_headers(headers: &reqwest::header::HeaderMap) -> Result<Vec<Link>, LinkError> {
    let values = headers
        .get_all(reqwest::header::LINK)
        .iter()
        .map(|v| v.to_str().map_err(|_| LinkError::NotText))
        .collect::<Result<Vec<_>, _>>()?;
    parse_link_headers(values)
}

/// Parse one header occurrence, which may hold several comma-separated link-values.
pub fn parse_link_header(value: &str) -> Result<Vec<Link>, LinkError> {
    let mut out = Vec::new();
    parse_into(value, &mut out)?;
    Ok(out)
}

fn parse_into(value: &str, out: &mut Vec<Link>) -> Result<(), LinkError> {
    let mut state = State::Initial;
    let mut buf = String::new();
    let mut name = String::new();
    let mut partial = Link::default();

    let unexpected = |expected: &'static str, found: char, offset: usize| LinkError::UnexpectedChar {
        expected,
        found,
        offset,
        header: value.to_string(),
    };

    for (offset, ch) in value.char_indices() {
        let class = classify(ch);
        state = match (state, class) {
            (State::Initial, Class::Space | Class::Comma) => State::Initial,
            (State::Initial, Class::LessThan) => State::Url,
            (State::Initial, _) => return Err(unexpected("'<'", ch, offset)),

            (State::Url, Class::GreaterThan) => {
                partial.target = std::mem::take(&mut buf);
                State::WantParam
            }
            (State::Url, _) => {
                buf.push(ch);
                State::Url
            }

            (State::WantParam, Class::Comma) => {
                out.push(std::mem::take(&mut partial));
                State::Initial
            }
            (State::WantParam, Class::Semicolon) => State::Semicolon,
            (State::WantParam, Class::Space) => State::WantParam,
            (State::WantParam, _) => return Err(unexpected("';' or ','", ch, offset)),

            (State::Semicolon, Class::Semicolon | Class::Space) => State::Semicolon,
            (State::Semicolon, Class::Word) => {
                buf.push(ch);
                State::ParamName
            }
            (State::Semicolon, _) => return Err(unexpected("param name", ch, offset)),

            (State::ParamName, Class::Comma) => {
                partial.set_param(&buf, String::new());
                buf.clear();
                out.push(std::mem::take(&mut partial));
                State::Initial
            }
            (State::ParamName, Class::Semicolon) => {
                partial.set_param(&buf, String::new());
                buf.clear();
                State::Semicolon
            }
            (State::ParamName, Class::Equals) => {
                name = std::mem::take(&mut buf);
                State::Equal
            }
            (State::ParamName, Class::Word) => {
                buf.push(ch);
                State::ParamName
            }
            (State::ParamName, _) => return Err(unexpected("param name or '='", ch, offset)),

            (State::Equal, Class::DoubleQuote) => State::ValueQuoted,
            (State::Equal, Class::Word) => {
                buf.push(ch);
                State::ValueUnquoted
            }
            (State::Equal, _) => return Err(unexpected("param value", ch, offset)),

            (State::ValueUnquoted, Class::Comma) => {
                partial.set_param(&name, std::mem::take(&mut buf));
                out.push(std::mem::take(&mut partial));
                State::Initial
            }
            (State::ValueUnquoted, Class::Semicolon) => {
                partial.set_param(&name, std::mem::take(&mut buf));
                State::Semicolon
            }
            (State::ValueUnquoted, Class::Space) => {
                partial.set_param(&name, std::mem::take(&mut buf));
                State::WantParam
            }
            (State::ValueUnquoted, Class::Word) => {
                buf.push(ch);
                State::ValueUnquoted
            }
            (State::ValueUnquoted, _) => return Err(unexpected("param value", ch, offset)),

            (State::ValueQuoted, Class::DoubleQuote) => {
                partial.set_param(&name, std::mem::take(&mut buf));
                State::WantParam
            }
            (State::ValueQuoted, Class::Backslash) => State::ValueQuotedEscape,
            (State::ValueQuoted, _) => {
                buf.push(ch);
                State::ValueQuoted
            }

            (State::ValueQuotedEscape, _) => {
                buf.push(ch);
                State::ValueQuoted
            }
        };
    }

    let unterminated = |expected: &'static str| LinkError::UnexpectedEnd {
        expected,
        header: value.to_string(),
    };
    match state {
        State::Initial => {}
        State::WantParam | State::Semicolon => out.push(partial),
        State::ParamName => {
            partial.set_param(&buf, String::new());
            out.push(partial);
        }
        State::ValueUnquoted => {
            partial.set_param(&name, buf);
            out.push(partial);
        }
        State::Url => return Err(unterminated("'>'")),
        State::Equal => return Err(unterminated("param value")),
        State::ValueQuoted | State::ValueQuotedEscape => return Err(unterminated("closing '\"'")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_links_in_order() {
        let links =
            parse_link_header(r#"<https://x/y?p=2>; rel="next", <https://x/y?p=0>; rel="first""#).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "https://x/y?p=2");
        assert_eq!(links[0].rel.as_deref(), Some("next"));
        assert_eq!(links[1].target, "https://x/y?p=0");
        assert_eq!(links[1].rel.as_deref(), Some("first"));
    }

    #[test]
    fn missing_angle_bracket_is_an_error() {
        let err = parse_link_header("x").unwrap_err();
        assert!(matches!(err, LinkError::UnexpectedChar { found: 'x', offset: 0, .. }));
    }

    #[test]
    fn mastodon_pagination_header() {
        let header = "<https://social.example/api/v1/admin/domain_blocks?max_id=104>; rel=\"next\", \
                      <https://social.example/api/v1/admin/domain_blocks?min_id=125>; rel=\"prev\"";
        let links = parse_link_header(header).unwrap();
        let next = links.iter().find(|l| l.has_rel("next")).unwrap();
        assert_eq!(next.target, "https://social.example/api/v1/admin/domain_blocks?max_id=104");
        assert!(links[1].has_rel("prev"));
    }

    #[test]
    fn unquoted_values_and_known_params() {
        let links = parse_link_header("</style.css>; rel=preload; as=style; HrefLang=en ; crossorigin").unwrap();
        assert_eq!(links.len(), 1);
        let link = &links[0];
        assert_eq!(link.rel.as_deref(), Some("preload"));
        assert_eq!(link.as_.as_deref(), Some("style"));
        assert_eq!(link.lang.as_deref(), Some("en"));
        assert_eq!(link.cross_origin.as_deref(), Some(""));
    }

    #[test]
    fn quoted_values_honour_escapes() {
        let links = parse_link_header(r#"<a>; title="say \"hi\", then; go""#).unwrap();
        assert_eq!(links[0].title.as_deref(), Some(r#"say "hi", then; go"#));
    }

    #[test]
    fn unknown_params_are_kept_not_fatal() {
        let links = parse_link_header(r#"<a>; rel=next; x-custom="1""#).unwrap();
        assert_eq!(links[0].rel.as_deref(), Some("next"));
        assert_eq!(links[0].extensions, vec![("x-custom".to_string(), "1".to_string())]);
    }

    #[test]
    fn occurrences_are_concatenated() {
        let links = parse_link_headers(["<a>; rel=next", "", "<b>; rel=last, <c>"]).unwrap();
        let targets: Vec<_> = links.iter().map(|l| l.target.as_str()).collect();
        assert_eq!(targets, ["a", "b", "c"]);
        assert_eq!(links[2].rel, None);
    }

    #[test]
    fn error_in_later_occurrence_fails_the_call() {
        assert!(parse_link_headers(["<a>; rel=next", "<b> rel=next"]).is_err());
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(matches!(parse_link_header("<https://x/y"), Err(LinkError::UnexpectedEnd { .. })));
        assert!(matches!(parse_link_header("<a>; rel="), Err(LinkError::UnexpectedEnd { .. })));
        assert!(matches!(parse_link_header("<a>; rel=\"next"), Err(LinkError::UnexpectedEnd { .. })));
    }

    #[test]
    fn rejects_characters_outside_the_grammar() {
        assert!(parse_link_header("<a>; rel=next/prev").is_err());
        assert!(parse_link_header("<a>; =next").is_err());
        assert!(parse_link_header("<a> x").is_err());
    }

    #[test]
    fn resolves_relative_targets() {
        let links = parse_link_header("</api/v1/admin/domain_blocks?max_id=9>; rel=\"next\"").unwrap();
        let base = Url::parse("https://social.example/api/v1/admin/domain_blocks").unwrap();
        assert_eq!(
            links[0].resolve(&base).unwrap().as_str(),
            "https://social.example/api/v1/admin/domain_blocks?max_id=9"
        );
    }
}
