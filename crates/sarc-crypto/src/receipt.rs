//! # Receipt Verification
//!
//! An App Store receipt payload is a DER `SET` of attribute sequences:
//!
//! ```text
//! ReceiptAttribute ::= SEQUENCE {
//!     type    INTEGER,
//!     version INTEGER,
//!     value   OCTET STRING
//! }
//! ```
//!
//! [`BundleReceiptVerifier`] checks that the receipt was issued for the
//! expected bundle and for this device: the SHA-1 of
//! `device id ‖ opaque value ‖ bundle id bytes` must equal the stored hash.
//! Optionally it also requires an in-app purchase of a given product.
//!
//! The PKCS #7 envelope and its signature are not handled here; callers pass
//! the already extracted payload.

use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Attribute type of the bundle identifier.
pub const ATTR_BUNDLE_ID: i64 = 2;
/// Attribute type of the opaque per-receipt value.
pub const ATTR_OPAQUE: i64 = 4;
/// Attribute type of the SHA-1 device hash.
pub const ATTR_HASH: i64 = 5;
/// Attribute type of an in-app purchase record.
pub const ATTR_IN_APP: i64 = 17;
/// In-app purchase attribute type of the product identifier.
pub const ATTR_PRODUCT_ID: i64 = 1702;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_IA5_STRING: u8 = 0x16;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;

/// Reasons a receipt is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("malformed DER at offset {offset}: {reason}")]
    Der { offset: usize, reason: &'static str },

    #[error("receipt has no attribute of type {0}")]
    MissingAttribute(i64),

    #[error("receipt is for bundle \"{found}\", expected \"{expected}\"")]
    BundleMismatch { expected: String, found: String },

    #[error("receipt hash does not match this device")]
    HashMismatch,

    #[error("receipt holds no purchase of \"{0}\"")]
    ProductMissing(String),
}

/// Platform identifier of the device the receipt must belong to.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity(Vec<u8>);

impl DeviceIdentity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceIdentity({} bytes)", self.0.len())
    }
}

/// Decides whether a receipt payload is valid for a device.
pub trait ReceiptVerifier {
    fn verify(&self, payload: &[u8], device: &DeviceIdentity) -> bool;
}

/// One decoded receipt attribute. `value` is the raw OCTET STRING content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptAttribute {
    pub kind: i64,
    pub version: i64,
    pub value: Vec<u8>,
}

/// Decode the attribute set of a receipt payload.
pub fn parse_attributes(payload: &[u8]) -> Result<Vec<ReceiptAttribute>, ReceiptError> {
    let mut outer = DerReader::new(payload);
    let set = outer.read(TAG_SET)?;
    outer.finish()?;

    let mut attributes = Vec::new();
    let mut entries = DerReader::nested(set, outer.content_offset);
    while !entries.is_empty() {
        let sequence = entries.read(TAG_SEQUENCE)?;
        let mut fields = DerReader::nested(sequence, entries.content_offset);
        let kind = fields.read_integer()?;
        let version = fields.read_integer()?;
        let value = fields.read(TAG_OCTET_STRING)?.to_vec();
        fields.finish()?;
        attributes.push(ReceiptAttribute {
            kind,
            version,
            value,
        });
    }
    Ok(attributes)
}

/// Verifies receipts for one bundle identifier.
#[derive(Debug, Clone)]
pub struct BundleReceiptVerifier {
    bundle_id: String,
    product_id: Option<String>,
}

impl BundleReceiptVerifier {
    pub fn new(bundle_id: impl Into<String>) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            product_id: None,
        }
    }

    /// Additionally require an in-app purchase of `product_id`.
    pub fn requiring_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Full check with the rejection reason.
    pub fn check(&self, payload: &[u8], device: &DeviceIdentity) -> Result<(), ReceiptError> {
        let attributes = parse_attributes(payload)?;
        let find = |kind: i64| {
            attributes
                .iter()
                .find(|attr| attr.kind == kind)
                .ok_or(ReceiptError::MissingAttribute(kind))
        };
        let bundle = find(ATTR_BUNDLE_ID)?;
        let opaque = find(ATTR_OPAQUE)?;
        let stored_hash = find(ATTR_HASH)?;

        let found = decode_string(&bundle.value)?;
        if found != self.bundle_id {
            return Err(ReceiptError::BundleMismatch {
                expected: self.bundle_id.clone(),
                found,
            });
        }

        let mut hasher = Sha1::new();
        hasher.update(device.as_bytes());
        hasher.update(&opaque.value);
        hasher.update(&bundle.value);
        let computed = hasher.finalize();
        if !bool::from(computed.as_slice().ct_eq(&stored_hash.value)) {
            return Err(ReceiptError::HashMismatch);
        }

        if let Some(product_id) = &self.product_id {
            if !has_purchase(&attributes, product_id)? {
                return Err(ReceiptError::ProductMissing(product_id.clone()));
            }
        }
        Ok(())
    }
}

impl ReceiptVerifier for BundleReceiptVerifier {
    fn verify(&self, payload: &[u8], device: &DeviceIdentity) -> bool {
        match self.check(payload, device) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(bundle_id = %self.bundle_id, error = %err, "receipt rejected");
                false
            }
        }
    }
}

fn has_purchase(attributes: &[ReceiptAttribute], product_id: &str) -> Result<bool, ReceiptError> {
    for purchase in attributes.iter().filter(|attr| attr.kind == ATTR_IN_APP) {
        let fields = parse_attributes(&purchase.value)?;
        for field in fields.iter().filter(|f| f.kind == ATTR_PRODUCT_ID) {
            if decode_string(&field.value)? == product_id {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Text carried as a DER string inside an attribute value.
fn decode_string(value: &[u8]) -> Result<String, ReceiptError> {
    let mut reader = DerReader::new(value);
    let (tag, content) = reader.read_any()?;
    reader.finish()?;
    if tag != TAG_UTF8_STRING && tag != TAG_IA5_STRING {
        return Err(ReceiptError::Der {
            offset: 0,
            reason: "expected a UTF8String or IA5String",
        });
    }
    String::from_utf8(content.to_vec()).map_err(|_| ReceiptError::Der {
        offset: reader.content_offset,
        reason: "string is not valid UTF-8",
    })
}

/// Bounds-checked reader over definite-length DER.
struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Offset of `data` within the outermost buffer, for error reports.
    base: usize,
    /// Absolute offset of the content of the element read last.
    content_offset: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self::nested(data, 0)
    }

    fn nested(data: &'a [u8], base: usize) -> Self {
        Self {
            data,
            pos: 0,
            base,
            content_offset: base,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn error(&self, reason: &'static str) -> ReceiptError {
        ReceiptError::Der {
            offset: self.base + self.pos,
            reason,
        }
    }

    fn byte(&mut self) -> Result<u8, ReceiptError> {
        let byte = *self.data.get(self.pos).ok_or_else(|| self.error("unexpected end"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_any(&mut self) -> Result<(u8, &'a [u8]), ReceiptError> {
        let tag = self.byte()?;
        let first = self.byte()?;
        let len = match first {
            0x00..=0x7f => usize::from(first),
            0x81..=0x84 => {
                let mut len = 0usize;
                for _ in 0..(first & 0x7f) {
                    len = (len << 8) | usize::from(self.byte()?);
                }
                len
            }
            _ => return Err(self.error("unsupported length encoding")),
        };
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.error("length past end of input"))?;
        let content = &self.data[self.pos..end];
        self.content_offset = self.base + self.pos;
        self.pos = end;
        Ok((tag, content))
    }

    fn read(&mut self, expected: u8) -> Result<&'a [u8], ReceiptError> {
        let start = self.pos;
        let (tag, content) = self.read_any()?;
        if tag != expected {
            self.pos = start;
            return Err(self.error("unexpected tag"));
        }
        Ok(content)
    }

    fn read_integer(&mut self) -> Result<i64, ReceiptError> {
        let content = self.read(TAG_INTEGER)?;
        if content.is_empty() || content.len() > 8 {
            return Err(self.error("integer width out of range"));
        }
        let negative = content[0] & 0x80 != 0;
        let mut value: i64 = if negative { -1 } else { 0 };
        for byte in content {
            value = (value << 8) | i64::from(*byte);
        }
        Ok(value)
    }

    fn finish(&self) -> Result<(), ReceiptError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.error("trailing bytes"))
        }
    }
}
