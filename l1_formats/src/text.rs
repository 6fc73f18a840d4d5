//! Character-set recovery for decrypted configuration text.

use encoding_rs::{BIG5, EUC_KR, Encoding, GBK, SHIFT_JIS, UTF_8};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::cipher::{LegacyCipher, is_encrypted};
use crate::error::Result;

/// How far into the payload the encoding declaration is searched for.
const DECLARATION_WINDOW: usize = 200;

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)encoding\s*=\s*["']([A-Za-z0-9._:\-]+)["']"#)
        .expect("encoding declaration pattern is valid")
});

/// Regional file-name suffixes and the charset each implies.
fn regional_encoding(file_name: &str) -> Option<&'static Encoding> {
    let lower = file_name.to_ascii_lowercase();
    if lower.contains("-k.") {
        Some(EUC_KR)
    } else if lower.contains("-j.") {
        Some(SHIFT_JIS)
    } else if lower.contains("-h.") {
        Some(BIG5)
    } else if lower.contains("-c.") {
        Some(GBK)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Declaration,
    FileName,
    Default,
}

#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
}

/// Picks the charset for `bytes`: embedded declaration first, then the
/// file-name suffix, then UTF-8.
pub fn detect_encoding(
    bytes: &[u8],
    file_name: Option<&str>,
) -> (&'static Encoding, EncodingSource) {
    let window = &bytes[..bytes.len().min(DECLARATION_WINDOW)];
    if let Some(label) = DECLARATION.captures(window).and_then(|caps| caps.get(1)) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => return (encoding, EncodingSource::Declaration),
            None => log::warn!(
                "unknown encoding declaration {:?}, falling back",
                String::from_utf8_lossy(label.as_bytes())
            ),
        }
    }

    if let Some(encoding) = file_name.and_then(regional_encoding) {
        return (encoding, EncodingSource::FileName);
    }

    (UTF_8, EncodingSource::Default)
}

pub fn decode_text(bytes: &[u8], file_name: Option<&str>) -> DecodedText {
    let (encoding, source) = detect_encoding(bytes, file_name);
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::warn!("{} text contained malformed sequences", encoding.name());
    }
    DecodedText {
        text: text.into_owned(),
        encoding,
        source,
    }
}

pub fn encode_text(text: &str, encoding: &'static Encoding) -> Vec<u8> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        log::warn!("text has characters not representable in {}", encoding.name());
    }
    bytes.into_owned()
}

/// Decrypts the payload when it carries the encrypted marker, then decodes
/// the text. Plaintext payloads are decoded as they are.
pub fn read_config_text(
    cipher: &LegacyCipher,
    payload: Vec<u8>,
    file_name: Option<&str>,
) -> Result<DecodedText> {
    let plain = if is_encrypted(&payload) {
        cipher.decrypt_payload(payload)?
    } else {
        payload
    };
    Ok(decode_text(&plain, file_name))
}

/// Re-encodes `text` and encrypts it for the client.
pub fn write_config_text(
    cipher: &LegacyCipher,
    text: &str,
    encoding: &'static Encoding,
) -> Result<Vec<u8>> {
    cipher.encrypt_payload(encode_text(text, encoding))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_wins_over_file_name() {
        let xml = br#"<?xml version="1.0" encoding="Shift_JIS"?><root/>"#;
        let (encoding, source) = detect_encoding(xml, Some("items-k.xml"));
        assert_eq!(encoding, SHIFT_JIS);
        assert_eq!(source, EncodingSource::Declaration);
    }

    #[test]
    fn declaration_beyond_window_is_ignored() {
        let mut xml = vec![b' '; DECLARATION_WINDOW];
        xml.extend_from_slice(br#"encoding="euc-kr""#);
        let (encoding, source) = detect_encoding(&xml, None);
        assert_eq!(encoding, UTF_8);
        assert_eq!(source, EncodingSource::Default);
    }

    #[test]
    fn suffix_heuristic_picks_regional_charsets() {
        let body = b"<root/>";
        assert_eq!(detect_encoding(body, Some("npc-k.xml")).0, EUC_KR);
        assert_eq!(detect_encoding(body, Some("NPC-J.XML")).0, SHIFT_JIS);
        assert_eq!(detect_encoding(body, Some("npc-h.xml")).0, BIG5);
        assert_eq!(detect_encoding(body, Some("npc-c.xml")).0, GBK);
        assert_eq!(detect_encoding(body, Some("npc.xml")).0, UTF_8);
    }

    #[test]
    fn unknown_declaration_falls_back() {
        let xml = br#"<?xml encoding="klingon-8"?>"#;
        let (encoding, source) = detect_encoding(xml, Some("a-j.xml"));
        assert_eq!(encoding, SHIFT_JIS);
        assert_eq!(source, EncodingSource::FileName);
    }

    #[test]
    fn korean_config_survives_encrypt_and_decrypt() {
        let cipher = LegacyCipher::default();
        let text = "<?xml version=\"1.0\"?><item name=\"단검\"/>";
        let sealed = write_config_text(&cipher, text, EUC_KR).unwrap();
        assert!(is_encrypted(&sealed));

        let decoded = read_config_text(&cipher, sealed, Some("item-k.xml")).unwrap();
        assert_eq!(decoded.text, text);
        assert_eq!(decoded.encoding, EUC_KR);
    }

    #[test]
    fn plaintext_payload_is_decoded_directly() {
        let cipher = LegacyCipher::default();
        let decoded = read_config_text(&cipher, b"<a>ok</a>".to_vec(), None).unwrap();
        assert_eq!(decoded.text, "<a>ok</a>");
    }
}
