use derive_more::Display;

/// The metric types understood by statsite's line protocol.
/// The [Display] output is the type suffix that follows the `|` on the wire.
#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq)]
pub enum MetricKind {
    /// Absolute value
    #[display("g")]
    Gauge,
    /// Raw key/value event
    #[display("kv")]
    KeyValue,
    /// Counter increment
    #[display("c")]
    Counter,
    /// Timing sample
    #[display("ms")]
    Sample,
}

/// A name/value pair attached to a metric. Statsite has no native
/// notion of labels, so only the value ends up in the key.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn sanitize(c: char) -> char {
    match c {
        ':' | ' ' => '_',
        other => other,
    }
}

fn flatten<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut flat = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            flat.push('.');
        }
        flat.extend(segment.chars().map(sanitize));
    }
    flat
}

/// Joins the key segments with `.`, replacing spaces and colons with `_`.
///
/// Nothing else is escaped: a `|` or newline in a segment will corrupt the line.
pub fn flatten_key<S: AsRef<str>>(parts: &[S]) -> String {
    flatten(parts.iter().map(AsRef::as_ref))
}

/// [flatten_key] with each label's value appended as a trailing segment.
pub fn flatten_key_labels<S: AsRef<str>>(parts: &[S], labels: &[Label]) -> String {
    flatten(
        parts
            .iter()
            .map(AsRef::as_ref)
            .chain(labels.iter().map(|label| label.value.as_str())),
    )
}

/// Encodes one newline-terminated metric line, e.g. `api.requests:1|c\n`.
///
/// Values use `f32`'s `Display`. Non-finite values come out as `inf`, `-inf`
/// and `NaN`, spellings statsite's `strtod` parses.
pub fn format_line(flat_key: &str, value: f32, kind: MetricKind) -> String {
    format!("{flat_key}:{value}|{kind}\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_flatten_key() {
        assert_eq!(flatten_key(&["a", "b c"]), "a.b_c");
        assert_eq!(flatten_key(&["svc", "db:primary", "latency"]), "svc.db_primary.latency");
        assert_eq!(flatten_key(&["single"]), "single");
        let empty: &[&str] = &[];
        assert_eq!(flatten_key(empty), "");
    }

    #[test]
    fn test_flatten_key_leaves_other_characters_alone() {
        assert_eq!(flatten_key(&["a-b", "c/d", "é"]), "a-b.c/d.é");
        // Misuse, but not guarded against.
        assert_eq!(flatten_key(&["a|b"]), "a|b");
    }

    #[test]
    fn test_flatten_key_labels() {
        assert_eq!(
            flatten_key_labels(&["svc"], &[Label::new("pair", "x:y")]),
            "svc.x_y"
        );
        let labels = vec![Label::new("region", "us east"), Label::new("host", "web1")];
        assert_eq!(
            flatten_key_labels(&["http", "requests"], &labels),
            "http.requests.us_east.web1"
        );
        assert_eq!(flatten_key_labels(&["plain"], &[]), "plain");
    }

    #[test]
    fn test_owned_segments() {
        let parts = vec!["owned".to_string(), "key name".to_string()];
        assert_eq!(flatten_key(&parts), "owned.key_name");
    }

    #[test]
    fn test_format_line() {
        assert_eq!(format_line("a.b", 1.5, MetricKind::Gauge), "a.b:1.5|g\n");
        assert_eq!(format_line("a.b", 2.0, MetricKind::KeyValue), "a.b:2|kv\n");
        assert_eq!(format_line("a.b", 1.0, MetricKind::Counter), "a.b:1|c\n");
        assert_eq!(format_line("a.b", 0.25, MetricKind::Sample), "a.b:0.25|ms\n");
        assert_eq!(format_line("neg", -3.5, MetricKind::Gauge), "neg:-3.5|g\n");
    }

    #[test]
    fn test_format_line_never_uses_exponents() {
        assert_eq!(
            format_line("big", 1e10, MetricKind::Gauge),
            "big:10000000000|g\n"
        );
        assert_eq!(format_line("small", 0.001, MetricKind::Gauge), "small:0.001|g\n");
    }

    #[test]
    fn test_format_line_non_finite() {
        assert_eq!(format_line("up", f32::INFINITY, MetricKind::Gauge), "up:inf|g\n");
        assert_eq!(
            format_line("down", f32::NEG_INFINITY, MetricKind::Gauge),
            "down:-inf|g\n"
        );
        assert_eq!(format_line("what", f32::NAN, MetricKind::Sample), "what:NaN|ms\n");
    }
}
