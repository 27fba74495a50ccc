// ── External I/O lines ──
//
// ExtIODump: <name> with <n> input(s), value = 0x.. and <m> output(s), value = 0x..
// extIOInputUpdate: input <name> updated with 0x.. from <as entered>
// extIOOutputUpdate: output <name> updated with 0x.. from <as entered>
// extIORemove: <name> removed
// EndExtIODump
//
// Bitfields are kept least significant byte first.

use std::fmt::Write as _;

use super::{Fields, starts_with_ci};
use crate::dispatch::Category;
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtIoLine {
    Dump {
        name: String,
        inputs: Vec<u8>,
        outputs: Vec<u8>,
    },
    InputUpdate {
        name: String,
        inputs: Vec<u8>,
    },
    OutputUpdate {
        name: String,
        outputs: Vec<u8>,
    },
    Removed {
        name: String,
    },
    EndOfDump,
}

impl ExtIoLine {
    /// Set name carried by the line, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Dump { name, .. }
            | Self::InputUpdate { name, .. }
            | Self::OutputUpdate { name, .. }
            | Self::Removed { name } => Some(name),
            Self::EndOfDump => None,
        }
    }
}

/// Number of bytes needed to hold `bits` I/O points.
pub fn bytes_for_bits(bits: u32) -> usize {
    usize::try_from(bits.div_ceil(8)).unwrap_or(usize::MAX)
}

/// Decode `0x..` into `len` bytes, least significant first. With `len`
/// of `None` the width follows the number of hex digits. A value with
/// non-zero bytes beyond `len` does not fit and yields `None`.
pub fn hex_to_bytes(raw: &str, len: Option<usize>) -> Option<Vec<u8>> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_owned()
    };

    let mut bytes = padded
        .as_bytes()
        .chunks(2)
        .rev()
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect::<Option<Vec<u8>>>()?;

    if let Some(len) = len {
        if bytes.iter().skip(len).any(|&b| b != 0) {
            return None;
        }
        bytes.resize(len, 0);
    }
    Some(bytes)
}

/// Encode least-significant-first bytes as `0x..`, most significant first.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    if bytes.is_empty() {
        out.push_str("00");
    }
    for b in bytes.iter().rev() {
        let _ = write!(out, "{b:02X}");
    }
    out
}

pub fn parse(line: &str) -> Result<ExtIoLine, ParseError> {
    if starts_with_ci(line, "EndExtIODump") {
        return Ok(ExtIoLine::EndOfDump);
    }

    let fields = Fields::new(Category::ExtIo, line);

    if starts_with_ci(line, "ExtIODump") {
        fields.require(14)?;
        if !fields.get(4)?.contains("input") || !fields.get(10)?.contains("output") {
            return Err(fields.error("dump line missing input/output markers"));
        }
        let in_bits: u32 = fields.parse(3, "input count")?;
        let out_bits: u32 = fields.parse(9, "output count")?;
        let inputs = decode(&fields, 7, Some(bytes_for_bits(in_bits)))?;
        let outputs = decode(&fields, fields.len() - 1, Some(bytes_for_bits(out_bits)))?;
        return Ok(ExtIoLine::Dump {
            name: fields.get(1)?.to_owned(),
            inputs,
            outputs,
        });
    }

    if starts_with_ci(line, "extIOInputUpdate") {
        fields.require(6)?;
        if !fields.get(1)?.eq_ignore_ascii_case("input") {
            return Err(fields.error("expected `input` after keyword"));
        }
        return Ok(ExtIoLine::InputUpdate {
            name: fields.get(2)?.to_owned(),
            inputs: decode(&fields, 5, None)?,
        });
    }

    if starts_with_ci(line, "extIOOutputUpdate") {
        fields.require(6)?;
        if !fields.get(1)?.eq_ignore_ascii_case("output") {
            return Err(fields.error("expected `output` after keyword"));
        }
        return Ok(ExtIoLine::OutputUpdate {
            name: fields.get(2)?.to_owned(),
            outputs: decode(&fields, 5, None)?,
        });
    }

    if starts_with_ci(line, "extIORemove") {
        fields.require(3)?;
        if !fields.get(2)?.eq_ignore_ascii_case("removed") {
            return Err(fields.error("expected `removed`"));
        }
        return Ok(ExtIoLine::Removed {
            name: fields.get(1)?.to_owned(),
        });
    }

    Err(fields.error("unrecognised external I/O line"))
}

fn decode(fields: &Fields<'_>, idx: usize, len: Option<usize>) -> Result<Vec<u8>, ParseError> {
    let raw = fields.get(idx)?;
    let bytes = hex_to_bytes(raw, None).ok_or_else(|| fields.error(format!("bad hex value {raw:?}")))?;
    match len {
        None => Ok(bytes),
        Some(len) => hex_to_bytes(raw, Some(len)).ok_or_else(|| {
            fields.error(format!("hex value {raw} is wider than the declared {len} byte(s)"))
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_dump_line() {
        let line = "ExtIODump: Bay1 with 16 input(s), value = 0x0102 and 8 output(s), value = 0xff";
        assert_eq!(
            parse(line).unwrap(),
            ExtIoLine::Dump {
                name: "Bay1".into(),
                inputs: vec![0x02, 0x01],
                outputs: vec![0xff],
            }
        );
    }

    #[test]
    fn short_hex_is_zero_padded_to_bit_width() {
        let line = "ExtIODump: Test with 16 input(s), value = 0x0 and 4 output(s), value = 0x00";
        let ExtIoLine::Dump { inputs, outputs, .. } = parse(line).unwrap() else {
            panic!("expected dump");
        };
        assert_eq!(inputs, vec![0, 0]);
        assert_eq!(outputs, vec![0]);
    }

    #[test]
    fn dump_value_wider_than_bit_count_is_rejected() {
        let line = "ExtIODump: Bay1 with 8 input(s), value = 0x0102 and 8 output(s), value = 0x00";
        let err = parse(line).unwrap_err();
        assert_eq!(err.category, Category::ExtIo);
        assert!(err.reason.contains("wider"));

        // Leading zero bytes still fit.
        let line = "ExtIODump: Bay1 with 8 input(s), value = 0x0002 and 8 output(s), value = 0x00";
        let ExtIoLine::Dump { inputs, .. } = parse(line).unwrap() else {
            panic!("expected dump");
        };
        assert_eq!(inputs, vec![0x02]);
    }

    #[test]
    fn parses_targeted_updates() {
        assert_eq!(
            parse("extIOInputUpdate: input Bay1 updated with 0x0A01 from 2561").unwrap(),
            ExtIoLine::InputUpdate {
                name: "Bay1".into(),
                inputs: vec![0x01, 0x0A],
            }
        );
        assert_eq!(
            parse("extIOOutputUpdate: output Bay1 updated with 0x3 from 3").unwrap(),
            ExtIoLine::OutputUpdate {
                name: "Bay1".into(),
                outputs: vec![0x03],
            }
        );
    }

    #[test]
    fn parses_remove_and_end() {
        assert_eq!(
            parse("extIORemove: Bay1 removed").unwrap(),
            ExtIoLine::Removed { name: "Bay1".into() }
        );
        assert_eq!(parse("EndExtIODump").unwrap(), ExtIoLine::EndOfDump);
    }

    #[test]
    fn bad_hex_is_a_parse_error() {
        let err = parse("extIOInputUpdate: input Bay1 updated with 0xZZ from 0").unwrap_err();
        assert_eq!(err.category, Category::ExtIo);
    }

    #[test]
    fn hex_helpers_are_byte_order_aware() {
        assert_eq!(bytes_to_hex(&[0x01, 0xA0]), "0xA001");
        assert_eq!(hex_to_bytes("0xA001", None).unwrap(), vec![0x01, 0xA0]);
        assert_eq!(hex_to_bytes("1", Some(2)).unwrap(), vec![0x01, 0x00]);
        assert_eq!(hex_to_bytes("0x1FF", Some(1)), None);
        assert_eq!(bytes_for_bits(9), 2);
        assert_eq!(bytes_for_bits(0), 0);
    }
}
