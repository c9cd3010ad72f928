//! `crypto-js`: message digests and HMACs.
//!
//! Digests come back as lowercase hex. The script-side adapter wraps them in
//! word-array-like objects whose `toString(enc)` defers to [`convert`].

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha256, Sha512};

use scriptbox_core::{traits::Export, traits::NativeModule, Error, Result};

use super::{arg_str, arg_text, unknown_function};

/// Hash and HMAC functions with CryptoJS names.
pub struct CryptoModule;

fn digest<D: Digest>(message: &str) -> String {
    let mut hasher = D::new();
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

fn hmac<M: Mac + hmac::digest::KeyInit>(message: &str, key: &str) -> Result<String> {
    let mut mac = <M as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| Error::module_call("invalid HMAC key length"))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Re-encode a hex digest (`hex`, `base64`, `latin1`, or `utf8`).
pub fn convert(hex_digest: &str, encoding: &str) -> Result<String> {
    let bytes = hex::decode(hex_digest)
        .map_err(|e| Error::module_call(format!("invalid digest: {}", e)))?;
    match encoding.to_ascii_lowercase().as_str() {
        "hex" => Ok(hex_digest.to_string()),
        "base64" => Ok(STANDARD.encode(bytes)),
        "latin1" => Ok(bytes.into_iter().map(char::from).collect()),
        "utf8" => String::from_utf8(bytes)
            .map_err(|_| Error::module_call("Malformed UTF-8 data")),
        other => Err(Error::module_call(format!("unknown encoding '{}'", other))),
    }
}

impl NativeModule for CryptoModule {
    fn name(&self) -> &str {
        "crypto-js"
    }

    fn exports(&self) -> Vec<Export> {
        [
            "MD5",
            "SHA1",
            "SHA256",
            "SHA512",
            "HmacMD5",
            "HmacSHA1",
            "HmacSHA256",
            "HmacSHA512",
            "convert",
        ]
        .into_iter()
        .map(Export::sync)
        .collect()
    }

    fn adapter(&self) -> Option<&str> {
        Some("crypto-js")
    }

    fn call(&self, function: &str, args: &[Value]) -> Result<Value> {
        let message = arg_text(args, 0);
        let hex_digest = match function {
            "MD5" => digest::<md5::Md5>(&message),
            "SHA1" => digest::<sha1::Sha1>(&message),
            "SHA256" => digest::<Sha256>(&message),
            "SHA512" => digest::<Sha512>(&message),
            "HmacMD5" => hmac::<Hmac<md5::Md5>>(&message, &arg_text(args, 1))?,
            "HmacSHA1" => hmac::<Hmac<sha1::Sha1>>(&message, &arg_text(args, 1))?,
            "HmacSHA256" => hmac::<Hmac<Sha256>>(&message, &arg_text(args, 1))?,
            "HmacSHA512" => hmac::<Hmac<Sha512>>(&message, &arg_text(args, 1))?,
            "convert" => convert(&message, arg_str(args, 1, "convert")?)?,
            other => return Err(unknown_function("crypto-js", other)),
        };
        Ok(json!(hex_digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(function: &str, args: &[Value]) -> String {
        CryptoModule
            .call(function, args)
            .unwrap()
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_digests() {
        assert_eq!(call("MD5", &[json!("abc")]), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            call("SHA1", &[json!("abc")]),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            call("SHA256", &[json!("abc")]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha256() {
        assert_eq!(
            call(
                "HmacSHA256",
                &[json!("The quick brown fox jumps over the lazy dog"), json!("key")]
            ),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_convert() {
        assert_eq!(call("convert", &[json!("6869"), json!("utf8")]), "hi");
        assert_eq!(call("convert", &[json!("6869"), json!("base64")]), "aGk=");
        assert!(CryptoModule.call("convert", &[json!("zz"), json!("hex")]).is_err());
    }
}
