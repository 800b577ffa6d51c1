use chrono::Local;
use colored::Colorize;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One hit returned by the search channel.
#[derive(Debug, Deserialize)]
pub struct SearchMatch {
    #[serde(rename = "type")]
    pub kind: String,
    pub field: String,
    pub value: Value,
}

impl SearchMatch {
    /// The identifying field for this kind of result.
    fn unique(&self) -> String {
        let key = match self.kind.as_str() {
            "block" | "transaction" => "hash",
            "account" => "address",
            "node" => "host",
            _ => return String::new(),
        };
        plain(&self.value[key])
    }
}

/// Terminal output settings derived from the global flags.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    pub json: bool,
    pub colors: bool,
    pub timestamps: bool,
}

impl Printer {
    pub fn value(&self, value: &Value) {
        println!("{}{}", self.prefix(), self.render(value));
    }

    pub fn error(&self, message: &str) {
        if self.json {
            println!("{}", Value::String(message.to_string()));
            return;
        }
        let line = format!("Error: {}", message);
        if self.colors {
            println!("{}{}", self.prefix(), line.red());
        } else {
            println!("{}{}", self.prefix(), line);
        }
    }

    /// Human-only status line, suppressed in JSON mode.
    pub fn notice(&self, message: &str) {
        if !self.json {
            println!("{}", message);
        }
    }

    pub fn search_results(&self, results: &Value) {
        if self.json {
            println!("{}", results);
            return;
        }
        for line in self.search_lines(results) {
            println!("{}", line);
        }
    }

    fn prefix(&self) -> String {
        if self.timestamps && !self.json {
            format!("[{}] ", Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }

    pub fn render(&self, value: &Value) -> String {
        if self.json {
            return value.to_string();
        }
        if !self.colors {
            return serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        }
        let mut out = String::new();
        render_colored(value, 0, &mut out);
        out
    }

    fn search_lines(&self, results: &Value) -> Vec<String> {
        let items = match results {
            Value::Array(items) if !items.is_empty() => items,
            Value::Array(_) | Value::Null => return vec!["No results found!".to_string()],
            other => return vec![plain(other)],
        };

        items
            .iter()
            .map(|item| match SearchMatch::deserialize(item) {
                Ok(m) => self.search_line(&m),
                Err(e) => {
                    warn!("Unrecognized search result, printing it raw: {}", e);
                    item.to_string()
                }
            })
            .collect()
    }

    fn search_line(&self, m: &SearchMatch) -> String {
        let unique = m.unique();
        let matched = plain(&m.value[m.field.as_str()]);
        if self.colors {
            format!(
                "{} {} matched {}: {}",
                m.kind.red(),
                unique.blue(),
                m.field.green(),
                matched.yellow()
            )
        } else {
            format!("{} {} matched {}: {}", m.kind, unique, m.field, matched)
        }
    }
}

/// Strings without quotes, anything else as JSON.
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_colored(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth + 1);
    let closing = "  ".repeat(depth);
    match value {
        Value::Object(map) if !map.is_empty() => {
            out.push_str("{\n");
            for (i, (key, item)) in map.iter().enumerate() {
                out.push_str(&indent);
                out.push_str(&format!("{}: ", key.cyan()));
                render_colored(item, depth + 1, out);
                if i + 1 < map.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&closing);
            out.push('}');
        }
        Value::Array(items) if !items.is_empty() => {
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                out.push_str(&indent);
                render_colored(item, depth + 1, out);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&closing);
            out.push(']');
        }
        Value::String(s) => out.push_str(&format!("'{}'", s).green().to_string()),
        Value::Number(n) => out.push_str(&n.to_string().yellow().to_string()),
        Value::Bool(b) => out.push_str(&b.to_string().yellow().to_string()),
        Value::Null => out.push_str(&"null".bold().to_string()),
        empty => out.push_str(&empty.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAIN: Printer = Printer {
        json: false,
        colors: false,
        timestamps: false,
    };

    #[test]
    fn search_lines_use_type_specific_unique_field() {
        let results = json!([
            {"type": "block", "field": "miner", "value": {"hash": "0xb1", "miner": "0xm"}},
            {"type": "account", "field": "balance", "value": {"address": "0xa1", "balance": 12}},
            {"type": "node", "field": "name", "value": {"host": "10.0.0.1", "name": "geth"}},
        ]);
        assert_eq!(
            PLAIN.search_lines(&results),
            vec![
                "block 0xb1 matched miner: 0xm",
                "account 0xa1 matched balance: 12",
                "node 10.0.0.1 matched name: geth",
            ]
        );
    }

    #[test]
    fn empty_search_says_so() {
        assert_eq!(PLAIN.search_lines(&json!([])), vec!["No results found!"]);
        assert_eq!(PLAIN.search_lines(&Value::Null), vec!["No results found!"]);
    }

    #[test]
    fn malformed_hit_does_not_hide_the_rest() {
        let results = json!([
            {"type": "block", "field": "miner", "value": {"hash": "0xb1", "miner": "0xm"}},
            {"type": "contract", "value": {"address": "0xc1"}},
        ]);
        let lines = PLAIN.search_lines(&results);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "block 0xb1 matched miner: 0xm");
        assert!(lines[1].contains("0xc1"));
        assert!(!lines.iter().any(|line| line == "No results found!"));
    }

    #[test]
    fn json_mode_is_compact() {
        let printer = Printer {
            json: true,
            ..PLAIN
        };
        assert_eq!(printer.render(&json!({"a": [1, 2]})), r#"{"a":[1,2]}"#);
        assert_eq!(PLAIN.render(&json!({"a": 1})), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn colored_rendering_keeps_structure() {
        colored::control::set_override(false);
        let printer = Printer {
            colors: true,
            ..PLAIN
        };
        let rendered = printer.render(&json!({"hash": "0x1", "uncles": [], "n": 3}));
        assert_eq!(rendered, "{\n  hash: '0x1',\n  n: 3,\n  uncles: []\n}");
    }
}
