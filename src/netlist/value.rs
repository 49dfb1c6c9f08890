//! Engineering-notation numbers and textual source specifications.

use crate::error::{NodalError, Result};
use crate::waveform::{Source, SourceKind};

/// Parse a number with an optional engineering suffix.
///
/// Suffixes are case sensitive where SPICE-style netlists disagree (`m` is
/// milli, `M` is mega); `meg` is accepted in any case.
///
/// ```
/// use nodal_core::netlist::parse_value;
/// assert_eq!(parse_value("10k"), Some(10_000.0));
/// assert_eq!(parse_value("1meg"), Some(1e6));
/// assert_eq!(parse_value("abc"), None);
/// ```
pub fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(v) = text.parse::<f64>() {
        return v.is_finite().then_some(v);
    }

    let lower = text.to_lowercase();
    let (num_str, multiplier) = if lower.ends_with("meg") {
        (&text[..text.len() - 3], 1e6)
    } else {
        let last = text.chars().last()?;
        let mult = match last {
            'P' => 1e15,
            't' | 'T' => 1e12,
            'g' | 'G' => 1e9,
            'M' => 1e6,
            'k' | 'K' => 1e3,
            'm' => 1e-3,
            'u' | 'U' | 'µ' => 1e-6,
            'n' | 'N' => 1e-9,
            'p' => 1e-12,
            'f' | 'F' => 1e-15,
            'a' | 'A' => 1e-18,
            _ => return None,
        };
        (&text[..text.len() - last.len_utf8()], mult)
    };

    num_str
        .trim_end()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

/// Parse a textual source: either `fn(arg, arg, ...)` or a bare value,
/// which means `dc(value)`.
pub fn parse_source_text(text: &str) -> Result<Source> {
    let text = text.trim();
    match (text.find('('), text.strip_suffix(')')) {
        (Some(open), Some(body)) => {
            let name = text[..open].trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(NodalError::invalid_source(format!(
                    "'{}' is not of the form name(arg, ...)",
                    text
                )));
            }
            let kind: SourceKind = name.parse()?;

            let inner = body[open + 1..].trim();
            let args = if inner.is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|a| {
                        parse_value(a).ok_or_else(|| {
                            NodalError::invalid_source(format!(
                                "the string \"{}\" could not be interpreted as a number",
                                a.trim()
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            Source::new(kind, &args)
        }
        _ => parse_value(text).map(Source::constant).ok_or_else(|| {
            NodalError::invalid_source(format!(
                "the string \"{}\" could not be interpreted as a number or a source function",
                text
            ))
        }),
    }
}
