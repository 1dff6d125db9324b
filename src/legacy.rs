use crate::value::Value;

/// Decoder for buffers that do not start with the marshal marker.
///
/// `offset` is where decoding should begin; the marshal decoder always
/// passes 0.
pub trait LegacyDecoder: Send + Sync {
    fn decode_legacy(&self, buffer: &[u8], offset: usize) -> Result<Value, String>;
}

impl<F> LegacyDecoder for F
where
    F: Fn(&[u8], usize) -> Result<Value, String> + Send + Sync,
{
    fn decode_legacy(&self, buffer: &[u8], offset: usize) -> Result<Value, String> {
        self(buffer, offset)
    }
}

/// Hands the raw buffer back unchanged as bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl LegacyDecoder for PassThrough {
    fn decode_legacy(&self, buffer: &[u8], offset: usize) -> Result<Value, String> {
        buffer
            .get(offset..)
            .map(|rest| Value::Bytes(rest.to_vec()))
            .ok_or_else(|| format!("offset {offset} past end of {}-byte buffer", buffer.len()))
    }
}
