//! Helpers for rendering metric series in the Prometheus exposition format.

use indexmap::IndexMap;

use crate::identity::LabelSet;
use crate::registry::MetricSeries;

/// Help text emitted for every metric rendered by this crate.
pub const HELP_TEXT: &str = "Custom metric based on HTTP headers";

/// Renders `series` in the Prometheus [exposition format].
///
/// Series are grouped by metric name, in the order each name first appears.  Every group gets one
/// `# HELP` line and one `# TYPE` line, the type being taken from the first series of the group,
/// followed by one line per series.
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn render(series: &[MetricSeries]) -> String {
    let mut families: IndexMap<&str, Vec<&MetricSeries>> = IndexMap::new();
    for s in series {
        families.entry(s.name()).or_default().push(s);
    }

    let mut output = String::new();
    for (name, members) in families {
        let Some(first) = members.first() else { continue };

        write_help_line(&mut output, name, HELP_TEXT);
        write_type_line(&mut output, name, first.kind().as_str());
        for s in members {
            write_metric_line(&mut output, name, s.labels(), s.value());
        }
    }

    output
}

/// Writes a help (description) line in the Prometheus [exposition format].
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn write_help_line(buffer: &mut String, name: &str, desc: &str) {
    buffer.push_str("# HELP ");
    buffer.push_str(name);
    buffer.push(' ');
    buffer.push_str(desc);
    buffer.push('\n');
}

/// Writes a metric type line in the Prometheus [exposition format].
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn write_type_line(buffer: &mut String, name: &str, metric_type: &str) {
    buffer.push_str("# TYPE ");
    buffer.push_str(name);
    buffer.push(' ');
    buffer.push_str(metric_type);
    buffer.push('\n');
}

/// Writes a single series in the Prometheus [exposition format].
///
/// Label names are written as-is, label values are escaped with [`sanitize_label_value`], and the
/// label block is left out entirely when `labels` is empty.  The value is written with
/// [`format_value`].
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn write_metric_line(buffer: &mut String, name: &str, labels: &LabelSet, value: f64) {
    buffer.push_str(name);

    if !labels.is_empty() {
        buffer.push('{');

        let mut first = true;
        for (key, value) in labels.iter() {
            if first {
                first = false;
            } else {
                buffer.push(',');
            }
            buffer.push_str(key);
            buffer.push_str("=\"");
            buffer.push_str(&sanitize_label_value(value));
            buffer.push('"');
        }

        buffer.push('}');
    }

    buffer.push(' ');
    buffer.push_str(&format_value(value));
    buffer.push('\n');
}

/// Formats a sample value with no fractional digits.
///
/// Finite values are rounded to the nearest integer.  Non-finite values use the
/// exposition format spellings `NaN`, `+Inf`, and `-Inf`.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let inf = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        inf.to_string()
    } else {
        format!("{value:.0}")
    }
}

/// Escapes a label value for the Prometheus [exposition format].
///
/// Backslashes, double quotes, and line feeds are escaped; every other character is kept.
///
/// [exposition format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
pub fn sanitize_label_value(value: &str) -> String {
    let mut sanitized = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => sanitized.push_str("\\\\"),
            '"' => sanitized.push_str("\\\""),
            '\n' => sanitized.push_str("\\n"),
            c => sanitized.push(c),
        }
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{format_value, render, sanitize_label_value, write_metric_line};
    use crate::common::MetricKind;
    use crate::identity::{series_key, LabelSet};
    use crate::registry::MetricStore;

    fn record(
        store: &MetricStore,
        name: &str,
        kind: MetricKind,
        pairs: &[(&str, &str)],
        value: f64,
    ) {
        let labels = pairs.iter().copied().collect::<LabelSet>();
        let key = series_key(name, &labels);
        store.update(key, name, kind, labels, |s| s.set(value));
    }

    #[test]
    fn test_format_value_known_cases() {
        let cases = &[
            (0.0, "0"),
            (1.0, "1"),
            (1024.0, "1024"),
            (2.4, "2"),
            (2.6, "3"),
            (1.5, "2"),
            (-3.7, "-4"),
            (f64::NAN, "NaN"),
            (f64::INFINITY, "+Inf"),
            (f64::NEG_INFINITY, "-Inf"),
        ];

        for (input, expected) in cases {
            assert_eq!(*expected, format_value(*input), "formatting {input}");
        }
    }

    #[test]
    fn test_sanitize_label_value_known_cases() {
        let cases = &[
            ("*", "*"),
            ("\"", "\\\""),
            ("\\", "\\\\"),
            ("\\\\", "\\\\\\\\"),
            ("\n", "\\n"),
            ("user123", "user123"),
            ("", ""),
        ];

        for (input, expected) in cases {
            let result = sanitize_label_value(input);
            assert_eq!(expected, &result);
        }
    }

    #[test]
    fn test_write_metric_line() {
        let mut buffer = String::new();
        write_metric_line(&mut buffer, "bare", &LabelSet::default(), 7.0);

        let labels = [("X-A", "1"), ("X-B", "")].into_iter().collect::<LabelSet>();
        write_metric_line(&mut buffer, "labeled", &labels, 3.0);

        assert_eq!(buffer, "bare 7\nlabeled{X-A=\"1\",X-B=\"\"} 3\n");
    }

    #[test]
    fn test_render_single_family() {
        let store = MetricStore::new();
        record(&store, "c", MetricKind::Counter, &[("X-User-ID", "user123")], 2.0);
        record(&store, "c", MetricKind::Counter, &[("X-User-ID", "user456")], 1.0);

        let expected = concat!(
            "# HELP c Custom metric based on HTTP headers\n",
            "# TYPE c counter\n",
            "c{X-User-ID=\"user123\"} 2\n",
            "c{X-User-ID=\"user456\"} 1\n",
        );
        assert_eq!(render(&store.snapshot()), expected);
    }

    #[test]
    fn test_render_groups_by_name() {
        let store = MetricStore::new();
        record(&store, "a", MetricKind::Counter, &[("X-A", "1")], 1.0);
        record(&store, "b", MetricKind::Histogram, &[("X-B", "1")], 10.0);
        record(&store, "a", MetricKind::Counter, &[("X-A", "2")], 5.0);

        let rendered = render(&store.snapshot());
        let expected = concat!(
            "# HELP a Custom metric based on HTTP headers\n",
            "# TYPE a counter\n",
            "a{X-A=\"1\"} 1\n",
            "a{X-A=\"2\"} 5\n",
            "# HELP b Custom metric based on HTTP headers\n",
            "# TYPE b histogram\n",
            "b{X-B=\"1\"} 10\n",
        );
        assert_eq!(rendered, expected);

        assert_eq!(rendered.matches("# HELP ").count(), 2);
        assert_eq!(rendered.matches("# TYPE ").count(), 2);
        assert_eq!(rendered.lines().filter(|l| !l.starts_with('#')).count(), 3);
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn test_render_escapes_label_values() {
        let store = MetricStore::new();
        record(&store, "g", MetricKind::Gauge, &[("X-Path", "a\"b\\c")], 1.0);

        let rendered = render(&store.snapshot());
        assert!(rendered.contains("g{X-Path=\"a\\\"b\\\\c\"} 1\n"), "{rendered}");
    }

    proptest! {
        #[test]
        fn test_sanitize_label_value(input in "[\n\"\\\\]?.*[\n\"\\\\]?") {
            let result = sanitize_label_value(&input);

            // If any raw newlines are still present, then we messed up.
            assert!(!result.contains('\n'), "raw/unescaped newlines present");

            // Walk the escapes: every backslash must start a known two-character escape, and no
            // double quote may appear outside of one.
            let mut chars = result.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        let escaped = chars.next();
                        assert!(matches!(escaped, Some('\\' | '"' | 'n')),
                            "invalid escape sequence in {:?}", result);
                    }
                    '"' => panic!("unescaped double quote in {:?}", result),
                    _ => {}
                }
            }
        }
    }
}
