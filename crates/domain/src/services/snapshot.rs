//! Conversion between the Prometheus exposition rendered by the local
//! recorder and the InfluxDB line protocol expected by the sink.

use std::collections::BTreeMap;

use super::reporter::ReporterTags;

/// One series value captured from the metrics registry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parses Prometheus text exposition. Comments, blank lines, malformed lines
/// and non-finite values are skipped.
pub fn parse_exposition(text: &str) -> Vec<MetricSample> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<MetricSample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (series, value) = line.rsplit_once(' ')?;
    let value: f64 = value.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let series = series.trim();
    let (name, labels) = match series.split_once('{') {
        Some((name, rest)) => (name, parse_labels(rest.strip_suffix('}')?)?),
        None => (series, BTreeMap::new()),
    };
    if name.is_empty() {
        return None;
    }

    Some(MetricSample {
        name: name.to_string(),
        labels,
        value,
    })
}

fn parse_labels(raw: &str) -> Option<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    let mut rest = raw.trim();

    while !rest.is_empty() {
        let (key, after) = rest.split_once("=\"")?;
        let mut value = String::new();
        let mut end = None;
        let mut chars = after.char_indices();
        while let Some((idx, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(if escaped == 'n' { '\n' } else { escaped });
                    }
                }
                '"' => {
                    end = Some(idx);
                    break;
                }
                other => value.push(other),
            }
        }

        labels.insert(key.trim().to_string(), value);
        rest = after[end? + 1..].trim_start_matches(',').trim();
    }

    Some(labels)
}

/// Renders samples as line protocol. Reporter tags win over sample labels with
/// the same key; empty tag values are dropped since the sink rejects them.
pub fn encode_line_protocol(
    samples: &[MetricSample],
    namespace: &str,
    tags: &ReporterTags,
    timestamp_secs: i64,
) -> String {
    let mut out = String::new();
    for sample in samples {
        let mut merged = sample.labels.clone();
        for (key, value) in tags.iter() {
            merged.insert(key.to_string(), value.to_string());
        }

        out.push_str(&escape_measurement(&format!("{namespace}{}", sample.name)));
        for (key, value) in merged.iter().filter(|(_, value)| !value.is_empty()) {
            out.push(',');
            out.push_str(&escape_tag(key));
            out.push('=');
            out.push_str(&escape_tag(value));
        }
        out.push_str(&format!(" value={} {timestamp_secs}\n", sample.value));
    }
    out
}

fn escape_measurement(raw: &str) -> String {
    raw.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(raw: &str) -> String {
    raw.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
