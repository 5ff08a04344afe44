//! Minimal YAML node tree and block-style emitter with anchors and aliases.
//!
//! Nodes are `Rc` handles. Referencing the same handle from two places makes the emitter
//! anchor it at its first occurrence (`&1`) and alias it afterwards (`*1`), so a node that
//! must be shared is built once and its handle cloned, never the node itself.

use regex::RegexSet;
use std::collections::HashMap;
use std::fmt::Write;
use std::rc::Rc;
use std::sync::OnceLock;

pub type NodeRef = Rc<Node>;

#[derive(Debug, PartialEq)]
pub enum Node {
    Str(String),
    /// Written plain so that a YAML 1.1 loader resolves it as a timestamp.
    Time(String),
    Int(u64),
    Bool(bool),
    Null,
    Map {
        tag: Option<String>,
        entries: Vec<(NodeRef, NodeRef)>,
    },
}

impl Node {
    pub fn str(value: impl Into<String>) -> NodeRef {
        Rc::new(Node::Str(value.into()))
    }

    pub fn time(value: impl Into<String>) -> NodeRef {
        Rc::new(Node::Time(value.into()))
    }

    pub fn int(value: u64) -> NodeRef {
        Rc::new(Node::Int(value))
    }

    pub fn bool(value: bool) -> NodeRef {
        Rc::new(Node::Bool(value))
    }

    pub fn null() -> NodeRef {
        Rc::new(Node::Null)
    }

    pub fn opt_str(value: Option<&str>) -> NodeRef {
        value.map_or_else(Node::null, Node::str)
    }

    /// Untagged mapping from `(key, value)` pairs, in the given order.
    pub fn map<K: Into<String>>(entries: Vec<(K, NodeRef)>) -> NodeRef {
        Self::build_map(None, entries)
    }

    /// Mapping with an explicit local tag such as `!ruby/object:Foo`.
    pub fn tagged_map<K: Into<String>>(tag: &str, entries: Vec<(K, NodeRef)>) -> NodeRef {
        Self::build_map(Some(tag.to_string()), entries)
    }

    fn build_map<K: Into<String>>(tag: Option<String>, entries: Vec<(K, NodeRef)>) -> NodeRef {
        let entries = entries.into_iter().map(|(k, v)| (Node::str(k), v)).collect();
        Rc::new(Node::Map { tag, entries })
    }
}

/// Render `root` as a single YAML document starting with `---`.
pub fn to_document(root: &NodeRef) -> String {
    let mut refs = HashMap::new();
    count_refs(root, &mut refs);
    let mut emitter = Emitter {
        refs,
        anchors: HashMap::new(),
        out: String::from("---"),
    };
    match &**root {
        Node::Map { tag: None, entries } if !entries.is_empty() && emitter.ref_count(root) == 1 => {
            emitter.out.push('\n');
            emitter.write_entries(entries, 0);
        }
        _ => emitter.write_value(root, 0),
    }
    emitter.out
}

fn count_refs(node: &NodeRef, refs: &mut HashMap<*const Node, usize>) {
    let seen = refs.entry(Rc::as_ptr(node)).or_insert(0);
    *seen += 1;
    if *seen > 1 {
        return;
    }
    if let Node::Map { entries, .. } = &**node {
        for (_, value) in entries {
            count_refs(value, refs);
        }
    }
}

struct Emitter {
    refs: HashMap<*const Node, usize>,
    anchors: HashMap<*const Node, usize>,
    out: String,
}

impl Emitter {
    fn ref_count(&self, node: &NodeRef) -> usize {
        self.refs.get(&Rc::as_ptr(node)).copied().unwrap_or(0)
    }

    fn write_entries(&mut self, entries: &[(NodeRef, NodeRef)], indent: usize) {
        for (key, value) in entries {
            for _ in 0..indent {
                self.out.push(' ');
            }
            self.out.push_str(&scalar(key));
            self.out.push(':');
            self.write_value(value, indent);
        }
    }

    /// Writes the value part of `key:` (or of `---`), ending with a newline.
    fn write_value(&mut self, node: &NodeRef, indent: usize) {
        let ptr = Rc::as_ptr(node);
        if self.ref_count(node) > 1 {
            if let Some(id) = self.anchors.get(&ptr) {
                let _ = writeln!(self.out, " *{}", id);
                return;
            }
            let id = self.anchors.len() + 1;
            self.anchors.insert(ptr, id);
            let _ = write!(self.out, " &{}", id);
        }
        match &**node {
            Node::Map { tag, entries } => {
                if let Some(tag) = tag {
                    let _ = write!(self.out, " {}", tag);
                }
                if entries.is_empty() {
                    self.out.push_str(" {}\n");
                } else {
                    self.out.push('\n');
                    self.write_entries(entries, indent + 2);
                }
            }
            _ => {
                let _ = writeln!(self.out, " {}", scalar(node));
            }
        }
    }
}

fn scalar(node: &Node) -> String {
    match node {
        Node::Str(s) if needs_quotes(s) => quote(s),
        Node::Str(s) | Node::Time(s) => s.clone(),
        Node::Int(n) => n.to_string(),
        Node::Bool(b) => b.to_string(),
        Node::Null | Node::Map { .. } => "null".to_string(),
    }
}

/// Plain scalars that a YAML 1.1 loader such as Psych resolves to a non-string type.
const YAML11_IMPLICIT: &[&str] = &[
    // int: binary, octal, decimal with `_`/`,` separators, hex, sexagesimal
    r"(?i)^[-+]?(0b[01_]+|0o?[0-7_]+|0|[1-9][0-9_,]*|0x[0-9a-f_]+|[1-9][0-9_]*(:[0-5]?[0-9])+)$",
    // float, including sexagesimal
    r"^[-+]?([0-9][0-9_,]*)?\.[0-9_]*([eE][-+]?[0-9]+)?$",
    r"^[-+]?[0-9][0-9_]*(:[0-5]?[0-9])+\.[0-9_]*$",
    r"(?i)^([-+]?\.inf|\.nan)$",
    // date, alone or starting a timestamp
    r"^[0-9]{4}-[0-9]{1,2}-[0-9]{1,2}([Tt ]|$)",
    // merge and value keys
    r"^(<<|=)$",
];

fn yaml11_implicit() -> Option<&'static RegexSet> {
    static SET: OnceLock<Option<RegexSet>> = OnceLock::new();
    SET.get_or_init(|| RegexSet::new(YAML11_IMPLICIT).ok()).as_ref()
}

/// Whether `s` written plain would read back as something other than that string.
fn needs_quotes(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return true;
    };
    let reserved = [
        "~", "null", "true", "false", "yes", "no", "on", "off", "y", "n", ".inf", "-.inf", ".nan",
    ];
    if reserved.iter().any(|r| r.eq_ignore_ascii_case(s)) {
        return true;
    }
    // an unusable pattern set quotes everything rather than risk a retyped value
    if yaml11_implicit().map_or(true, |set| set.is_match(s)) {
        return true;
    }
    if s.parse::<f64>().is_ok() || s.parse::<i64>().is_ok() {
        return true;
    }
    if "-?:,[]{}#&*!|>'\"%@`".contains(first) || first.is_whitespace() {
        return true;
    }
    if s.ends_with(char::is_whitespace) || s.ends_with(':') {
        return true;
    }
    s.contains(": ") || s.contains(" #") || s.chars().any(|c| c.is_control())
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
