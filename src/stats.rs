//! Per-run mutation counts.

use std::fmt::Write;
use std::ops::AddAssign;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub insert_count: u64,
    pub update_count: u64,
    pub delete_count: u64,
}

impl Stats {
    pub fn is_empty(&self) -> bool {
        self.insert_count == 0 && self.update_count == 0 && self.delete_count == 0
    }

    /// Human-readable summary for one server; only non-zero counts produce a line.
    pub fn report(&self, server_name: &str) -> String {
        let mut out = String::new();
        if self.insert_count > 0 {
            let _ = writeln!(out, "{}: added {} new block(s)", server_name, self.insert_count);
        }
        if self.update_count > 0 {
            let _ = writeln!(out, "{}: modified {} existing block(s)", server_name, self.update_count);
        }
        if self.delete_count > 0 {
            let _ = writeln!(
                out,
                "{}: deleted {} existing block(s) that are now remediated",
                server_name, self.delete_count
            );
        }
        out
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, rhs: Stats) {
        self.insert_count += rhs.insert_count;
        self.update_count += rhs.update_count;
        self.delete_count += rhs.delete_count;
    }
}
