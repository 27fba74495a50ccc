// ── ARCL line codec ──
//
// Inbound: `\n`-delimited lines with the trailing `\r` stripped. The
// password prompt is the one frame the server sends without a terminator,
// so it is surfaced as soon as it is complete.
// Outbound: every command is terminated with `\r\n`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;

pub(crate) const PASSWORD_PROMPT: &str = "Enter password";
pub(crate) const LINE_TERMINATOR: &str = "\r\n";

#[derive(Debug, Default, Clone, Copy)]
pub struct ArclCodec;

impl ArclCodec {
    pub fn new() -> Self {
        Self
    }
}

fn to_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .trim()
        .to_owned()
}

fn is_bare_prompt(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let text = text.trim_end();
    text.ends_with(':')
        && text
            .to_ascii_lowercase()
            .contains(&PASSWORD_PROMPT.to_ascii_lowercase())
}

impl Decoder for ArclCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Error> {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let raw = buf.split_to(pos + 1);
                let line = to_line(&raw);
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line));
            }

            if is_bare_prompt(buf) {
                let line = to_line(buf);
                buf.advance(buf.len());
                return Ok(Some(line));
            }

            return Ok(None);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        let line = to_line(buf);
        buf.clear();
        Ok((!line.is_empty()).then_some(line))
    }
}

impl Encoder<String> for ArclCodec {
    type Error = Error;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<(), Error> {
        Encoder::<&str>::encode(self, command.as_str(), dst)
    }
}

impl Encoder<&str> for ArclCodec {
    type Error = Error;

    fn encode(&mut self, command: &str, dst: &mut BytesMut) -> Result<(), Error> {
        let command = command.trim_end_matches(['\r', '\n']);
        dst.reserve(command.len() + LINE_TERMINATOR.len());
        dst.put_slice(command.as_bytes());
        dst.put_slice(LINE_TERMINATOR.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<String> {
        let mut codec = ArclCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn splits_crlf_lines_and_skips_blanks() {
        let lines = decode_all(b"QueueShow: a\r\n\r\nEndQueueShow\r\npartial");
        assert_eq!(lines, vec!["QueueShow: a", "EndQueueShow"]);
    }

    #[test]
    fn surfaces_unterminated_password_prompt() {
        let lines = decode_all(b"Enter password:\x20");
        assert_eq!(lines, vec!["Enter password:"]);
    }

    #[test]
    fn holds_partial_line_until_terminated() {
        let mut codec = ArclCodec::new();
        let mut buf = BytesMut::from(&b"Status: Sto"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"pped\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "Status: Stopped");
    }

    #[test]
    fn eof_flushes_trailing_fragment() {
        let mut codec = ArclCodec::new();
        let mut buf = BytesMut::from(&b"EndExtIODump"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap(), "EndExtIODump");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encoder_appends_single_crlf() {
        let mut codec = ArclCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("queueShowRobot", &mut dst).unwrap();
        codec.encode(String::from("onelinestatus\r\n"), &mut dst).unwrap();
        assert_eq!(&dst[..], b"queueShowRobot\r\nonelinestatus\r\n");
    }
}
