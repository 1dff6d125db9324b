//! Nibble run-length coding for the fixed area of packed rows.
//!
//! Each control byte carries two 4-bit run codes, low nibble first. A code
//! `c` means `c - 8`: negative values are a literal run of `8 - c` bytes that
//! follow the control byte, non-negative values a run of `c - 7` zero bytes.
//! Zero runs at the end of the input are dropped, the decoder zero-fills.
//! Decoding stops when the input is exhausted, so the high nibble of the
//! last control byte is ignored when no bytes follow it.

use crate::error::RowError;

/// Longest run a single code can describe.
const RUN_MAX: usize = 8;

/// Upper bound on the packed size of `len` input bytes.
#[inline]
pub fn max_packed_len(len: usize) -> usize {
    len + len.div_ceil(2)
}

/// Pack `input` into a fresh buffer.
pub fn pack(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_packed_len(input.len()));
    pack_into(input, &mut out);
    out
}

/// Pack `input` into a reusable buffer. The buffer is cleared first.
pub fn pack_into(input: &[u8], out: &mut Vec<u8>) {
    out.clear();

    let mut control = 0usize;
    let mut high = false;
    let mut zero_runs = 0usize;
    let mut pos = 0usize;

    while pos < input.len() {
        if !high {
            control = out.len();
            out.push(0);
        }

        let start = pos;
        let end = (pos + RUN_MAX).min(input.len());

        let code = if input[pos] != 0 {
            zero_runs = 0;
            while pos < end && input[pos] != 0 {
                out.push(input[pos]);
                pos += 1;
            }
            (RUN_MAX - (pos - start)) as u8
        } else {
            zero_runs += 1;
            while pos < end && input[pos] == 0 {
                pos += 1;
            }
            (pos - start + 7) as u8
        };

        if high {
            out[control] |= code << 4;
        } else {
            out[control] = code;
        }
        high = !high;
    }

    // An unused high nibble counts as an empty zero run, so every trailing
    // pair of zero runs is one control byte with no payload behind it.
    if high && zero_runs > 0 {
        zero_runs += 1;
    }
    let trailing = zero_runs / 2;
    out.truncate(out.len() - trailing);
}

/// Unpack `input` into `out`, zero-filling whatever the runs do not cover.
pub fn unpack(input: &[u8], out: &mut [u8]) -> Result<(), RowError> {
    let output_len = out.len();
    let fail = |reason| RowError::TruncatedRle {
        reason,
        input_len: input.len(),
        output_len,
    };

    let mut i = 0usize;
    let mut o = 0usize;
    let mut control = 0u8;
    let mut high = false;

    while i < input.len() {
        let code = if high {
            control >> 4
        } else {
            control = input[i];
            i += 1;
            control & 0x0f
        };
        high = !high;

        let run = i32::from(code) - 8;
        if run >= 0 {
            let n = run as usize + 1;
            if o + n > output_len {
                return Err(fail("zero run exceeds row size"));
            }
            out[o..o + n].fill(0);
            o += n;
        } else {
            let n = (-run) as usize;
            if o + n > output_len {
                return Err(fail("literal run exceeds row size"));
            }
            if i + n > input.len() {
                return Err(fail("literal run exceeds input"));
            }
            out[o..o + n].copy_from_slice(&input[i..i + n]);
            i += n;
            o += n;
        }
    }

    out[o..].fill(0);
    Ok(())
}

/// Unpack into a new buffer of exactly `size` bytes.
pub fn unpack_to_vec(input: &[u8], size: usize) -> Result<Vec<u8>, RowError> {
    let mut out = vec![0u8; size];
    unpack(input, &mut out)?;
    Ok(out)
}
