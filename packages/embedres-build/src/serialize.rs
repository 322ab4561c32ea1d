//! Turns raw file content into `uint8_t` array definitions.

use anyhow::{Result, bail};

const BYTES_PER_LINE: usize = 16;
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Literal text for one embedded resource, ready to be written in one go.
pub struct ByteArray {
    pub text: String,
    pub size: usize,
}

/// Renders the buffer and size constants for the resource with the given index.
///
/// Zero-sized arrays are not valid C++, so empty content gets a single `0`
/// element while the size constant stays 0.
pub fn byte_array(index: usize, content: &[u8]) -> ByteArray {
    // "0x00," is five characters, plus one newline per line
    let mut text = String::with_capacity(128 + content.len() * 5 + content.len() / BYTES_PER_LINE);
    text.push_str("    static const uint8_t resource");
    text.push_str(&index.to_string());
    text.push_str("Buffer[] = {");
    push_literals(&mut text, content);
    if content.is_empty() {
        text.push_str("  0");
    }
    text.push_str("  };\n");
    text.push_str(&format!(
        "    static const size_t resource{index}Size = {};\n",
        content.len()
    ));
    ByteArray {
        text,
        size: content.len(),
    }
}

fn push_literals(text: &mut String, content: &[u8]) {
    for (pos, byte) in content.iter().enumerate() {
        if pos > 0 {
            text.push(',');
        }
        if pos % BYTES_PER_LINE == 0 {
            text.push('\n');
        }
        text.push_str("0x");
        text.push(HEX_DIGITS[(byte >> 4) as usize] as char);
        text.push(HEX_DIGITS[(byte & 0x0f) as usize] as char);
    }
}

/// Recovers the bytes from text produced by [`byte_array`].
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let Some((_, rest)) = text.split_once('{') else {
        bail!("no array initializer found");
    };
    let Some((body, rest)) = rest.split_once('}') else {
        bail!("unterminated array initializer");
    };
    let Some(size) = rest
        .split_once("Size = ")
        .and_then(|(_, s)| s.split(';').next())
    else {
        bail!("no size constant found");
    };
    let size: usize = size.trim().parse()?;

    let mut bytes = Vec::with_capacity(size);
    for literal in body.split(',').map(str::trim) {
        let value = match literal.strip_prefix("0x") {
            Some(hex) => u8::from_str_radix(hex, 16)?,
            None => literal.parse()?,
        };
        bytes.push(value);
    }
    if size == 0 {
        if bytes != [0] {
            bail!("empty resource must hold exactly one placeholder element");
        }
        bytes.clear();
    }
    if bytes.len() != size {
        bail!("array holds {} bytes but its size is {size}", bytes.len());
    }
    Ok(bytes)
}
