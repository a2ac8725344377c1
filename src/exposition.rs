use std::collections::HashMap;

use crate::types::ExpositionSample;

/// ExpositionParser
///
/// Decodes a Prometheus text exposition payload into flat samples. It knows
/// nothing about metric names; see [`crate::extractor`] for that.
///
/// Grammar per line (after trimming):
///
/// ```text
/// line    := name [ "{" [ label { "," label } [ "," ] ] "}" ] value [ timestamp ]
/// label   := key "=" '"' escaped-string '"'
/// ```
///
/// Comment lines (`#`), blank lines and anything that does not match are
/// skipped. Parsing never fails as a whole.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpositionParser;

impl ExpositionParser {
    /// parse
    ///
    pub fn parse(&self, body: &str) -> Vec<ExpositionSample> {
        let samples: Vec<ExpositionSample> =
            body.lines().filter_map(|line| self.parse_line(line)).collect();

        tracing::debug!("parsed {} samples", samples.len());
        samples
    }

    /// parse_line
    ///
    /// `None` for comments, blank lines and lines that do not carry a sample.
    pub fn parse_line(&self, line: &str) -> Option<ExpositionSample> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let sample = Self::parse_sample(line);
        if sample.is_none() {
            tracing::trace!("skipping exposition line: {line}");
        }

        sample
    }

    fn parse_sample(line: &str) -> Option<ExpositionSample> {
        let mut cursor = Cursor::new(line);

        let name = cursor.take_while(|c| !c.is_whitespace() && c != '{');
        if name.is_empty() {
            return None;
        }

        let labels = if cursor.eat('{') {
            parse_labels(&mut cursor)?
        } else {
            HashMap::new()
        };

        let mut tokens = cursor.rest().split_whitespace();

        // f64's FromStr accepts "NaN", "+Inf" and "-Inf" case-insensitively
        let value = tokens.next()?.parse::<f64>().ok()?;
        let timestamp_ms = tokens.next().and_then(|token| token.parse::<i64>().ok());

        Some(ExpositionSample {
            name: name.to_string(),
            labels,
            value,
            timestamp_ms,
        })
    }
}

/// Reads `key="value",...}` with the cursor placed right after the `{`.
fn parse_labels(cursor: &mut Cursor<'_>) -> Option<HashMap<String, String>> {
    let mut labels = HashMap::new();

    loop {
        cursor.skip_whitespace();
        if cursor.eat('}') {
            break;
        }

        let key = cursor.take_while(is_label_name_char);
        if key.is_empty() {
            return None;
        }

        cursor.skip_whitespace();
        if !cursor.eat('=') {
            return None;
        }
        cursor.skip_whitespace();
        if !cursor.eat('"') {
            return None;
        }

        let value = parse_quoted(cursor)?;
        labels.insert(key.to_string(), value);

        cursor.skip_whitespace();
        if cursor.eat(',') {
            continue;
        }
        if cursor.eat('}') {
            break;
        }
        return None;
    }

    Some(labels)
}

/// Reads up to and including the closing quote.
fn parse_quoted(cursor: &mut Cursor<'_>) -> Option<String> {
    let mut value = String::new();

    loop {
        match cursor.bump()? {
            '"' => return Some(value),
            '\\' => match cursor.bump()? {
                'n' => value.push('\n'),
                other => value.push(other),
            },
            c => value.push(c),
        }
    }
}

fn is_label_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Cursor
///
/// Forward-only scanner over one line.
struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Vec<ExpositionSample> {
        ExpositionParser.parse(body)
    }

    #[test]
    fn test_parse_plain_sample() {
        let samples = parse("serverless_pod_scaled_difference 3\n");

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "serverless_pod_scaled_difference");
        assert!(samples[0].labels.is_empty());
        assert_eq!(samples[0].value, 3.0);
        assert_eq!(samples[0].timestamp_ms, None);
    }

    #[test]
    fn test_parse_labels_in_any_order() {
        let body = r#"
serverless_pod_container_started_at_seconds{namespace="default",pod="func-a",function="echo"} 1002.5
serverless_pod_container_started_at_seconds{pod="func-b", function="echo", namespace="default"} 998
"#;
        let samples = parse(body);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label("pod"), Some("func-a"));
        assert_eq!(samples[0].label("function"), Some("echo"));
        assert_eq!(samples[0].labels.len(), 3);
        assert_eq!(samples[1].label("pod"), Some("func-b"));
        assert_eq!(samples[1].label("namespace"), Some("default"));
        assert_eq!(samples[1].value, 998.0);
    }

    #[test]
    fn test_parse_escaped_and_spaced_label_values() {
        let body = r#"http_requests_total{path="/a b,c}",quote="say \"hi\"",nl="x\ny",} 7 1700000000000"#;
        let samples = parse(body);

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.label("path"), Some("/a b,c}"));
        assert_eq!(sample.label("quote"), Some("say \"hi\""));
        assert_eq!(sample.label("nl"), Some("x\ny"));
        assert_eq!(sample.value, 7.0);
        assert_eq!(sample.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_parse_empty_label_set() {
        let samples = parse("up{} 1");

        assert_eq!(samples.len(), 1);
        assert!(samples[0].labels.is_empty());
    }

    #[test]
    fn test_parse_non_finite_values() {
        let body = "a NaN\nb +Inf\nc -Inf\n";
        let samples = parse(body);

        assert_eq!(samples.len(), 3);
        assert!(samples[0].value.is_nan());
        assert_eq!(samples[1].value, f64::INFINITY);
        assert_eq!(samples[2].value, f64::NEG_INFINITY);
    }

    #[test]
    fn test_parse_skips_comments_blank_and_garbage() {
        let body = r#"
# HELP kubernetes_cluster_cpu_usage_millicores CPU usage
# TYPE kubernetes_cluster_cpu_usage_millicores gauge

   # indented comment
lonely_token
bad_value{pod="x"} not-a-number
unterminated{pod="x 1
missing_equals{pod "x"} 1
kubernetes_cluster_cpu_usage_millicores 250
"#;
        let samples = parse(body);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "kubernetes_cluster_cpu_usage_millicores");
        assert_eq!(samples[0].value, 250.0);
    }

    #[test]
    fn test_parse_never_fails() {
        for body in ["", "\n\n", "# only a comment", "{{{{", "}\"=,", "\u{0}\u{1} 2 3"] {
            let _ = parse(body);
        }
        assert!(parse("# HELP x\n# TYPE x gauge\n").is_empty());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let body = "a{x=\"1\"} 1\nb 2\n";

        assert_eq!(parse(body), parse(body));
    }

    #[test]
    fn test_parse_line_ignores_non_integer_timestamp() {
        let sample = ExpositionParser.parse_line("a 1 soon").unwrap();

        assert_eq!(sample.value, 1.0);
        assert_eq!(sample.timestamp_ms, None);
    }
}
