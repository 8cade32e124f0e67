//! Steim1 and Steim2 compression and decompression.
//!
//! These are differential integer compression schemes used in seismological
//! data (SEED/miniSEED format). See Appendix B of the SEED Manual v2.4.
//!
//! Data is laid out in 64-byte frames of sixteen 32-bit words. Word 0 of
//! each frame is a control word holding a 2-bit code per data word. In the
//! first frame, words 1 and 2 carry the forward (X0) and reverse (XN)
//! integration constants.

use log::warn;

use crate::types::ByteOrder;
use crate::{MseedError, Result};

pub const FRAME_SIZE: usize = 64; // 16 x 32-bit words
const WORDS_PER_FRAME: usize = 16;

/// Most differences a Steim1 frame can hold (15 words x 4).
pub const STEIM1_MAX_PER_FRAME: usize = 60;
/// Most differences a Steim2 frame can hold (15 words x 7).
pub const STEIM2_MAX_PER_FRAME: usize = 105;

/// Output of a Steim decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteimDecoded {
    /// Reconstructed samples, at most the requested count.
    pub samples: Vec<i32>,
    /// Forward integration constant (first sample).
    pub x0: i32,
    /// Reverse integration constant (declared last sample).
    pub xn: i32,
    /// Value reached by integrating every decoded difference.
    pub last_value: i32,
    /// Number of differences found in the frames.
    pub differences: usize,
}

impl SteimDecoded {
    /// True when integrating all differences reproduces XN.
    pub fn integrity_ok(&self) -> bool {
        self.differences == 0 || self.last_value == self.xn
    }
}

/// Output of a Steim encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteimEncoded {
    pub bytes: Vec<u8>,
    /// Number of leading input samples packed into `bytes`.
    pub packed: usize,
    /// Frames holding data, padding excluded.
    pub frames: usize,
}

fn extract_nibble(control_word: u32, word_index: usize) -> u8 {
    let shift = 30 - (word_index * 2);
    ((control_word >> shift) & 0x03) as u8
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value as i32).wrapping_shl(shift).wrapping_shr(shift)
}

/// Push `count` fields of `bits` width, most significant first, until
/// `limit` differences have been collected.
fn push_fields(word: u32, bits: u32, count: u32, diffs: &mut Vec<i32>, limit: usize) {
    let mask = if bits == 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    };
    for i in (0..count).rev() {
        if diffs.len() >= limit {
            break;
        }
        diffs.push(sign_extend((word >> (i * bits)) & mask, bits));
    }
}

fn steim1_unpack_word(word: u32, nibble: u8, diffs: &mut Vec<i32>, limit: usize) -> Result<()> {
    match nibble {
        0b00 => {} // no data
        0b01 => push_fields(word, 8, 4, diffs, limit),
        0b10 => push_fields(word, 16, 2, diffs, limit),
        _ => push_fields(word, 32, 1, diffs, limit),
    }
    Ok(())
}

fn steim2_unpack_word(word: u32, nibble: u8, diffs: &mut Vec<i32>, limit: usize) -> Result<()> {
    let dnib = ((word >> 30) & 0x03) as u8;

    match nibble {
        0b00 => {} // no data
        0b01 => push_fields(word, 8, 4, diffs, limit),
        0b10 => match dnib {
            0b01 => push_fields(word, 30, 1, diffs, limit),
            0b10 => push_fields(word, 15, 2, diffs, limit),
            0b11 => push_fields(word, 10, 3, diffs, limit),
            _ => {
                return Err(MseedError::SteimDecode(format!(
                    "steim2 nibble=10 invalid dnib={dnib}"
                )));
            }
        },
        _ => match dnib {
            0b00 => push_fields(word, 6, 5, diffs, limit),
            0b01 => push_fields(word, 5, 6, diffs, limit),
            0b10 => push_fields(word, 4, 7, diffs, limit),
            _ => {
                return Err(MseedError::SteimDecode(format!(
                    "steim2 nibble=11 invalid dnib={dnib}"
                )));
            }
        },
    }

    Ok(())
}

type UnpackWord = fn(u32, u8, &mut Vec<i32>, usize) -> Result<()>;

fn decode_frames(
    data: &[u8],
    num_samples: usize,
    req_samples: usize,
    byte_order: ByteOrder,
    level: u8,
    unpack_word: UnpackWord,
) -> Result<SteimDecoded> {
    if num_samples == 0 {
        return Ok(SteimDecoded {
            samples: Vec::new(),
            x0: 0,
            xn: 0,
            last_value: 0,
            differences: 0,
        });
    }

    let num_frames = data.len() / FRAME_SIZE;
    if num_frames == 0 {
        return Err(MseedError::SteimDecode("no frames in data".into()));
    }

    // X0 = forward integration constant, XN = reverse integration constant
    let x0 = byte_order.read_i32(data, 4);
    let xn = byte_order.read_i32(data, 8);

    let mut diffs = Vec::with_capacity(num_samples);
    'frames: for frame_idx in 0..num_frames {
        let frame_offset = frame_idx * FRAME_SIZE;
        let control_word = byte_order.read_u32(data, frame_offset);

        for word_idx in 1..WORDS_PER_FRAME {
            if diffs.len() >= num_samples {
                break 'frames;
            }
            // X0 and XN carry a 00 code and fall through as no data
            let nibble = extract_nibble(control_word, word_idx);
            let word = byte_order.read_u32(data, frame_offset + word_idx * 4);
            unpack_word(word, nibble, &mut diffs, num_samples)?;
        }
    }

    if diffs.len() != num_samples {
        warn!(
            "Number of samples decompressed doesn't match number in header: {} != {}",
            diffs.len(),
            num_samples
        );
    }

    // diffs[0] is relative to the previous record; sample 0 is X0 itself
    let out_count = req_samples.min(diffs.len());
    let mut samples = Vec::with_capacity(out_count);
    let mut acc = x0;
    for (i, &d) in diffs.iter().enumerate() {
        if i > 0 {
            acc = acc.wrapping_add(d);
        }
        if i < out_count {
            samples.push(acc);
        }
    }

    if !diffs.is_empty() && acc != xn {
        warn!("Data integrity check for Steim-{level} failed, last_data={acc}, xn={xn}");
    }

    Ok(SteimDecoded {
        samples,
        x0,
        xn,
        last_value: acc,
        differences: diffs.len(),
    })
}

/// Decode Steim1 compressed data.
///
/// `num_samples` is the count declared by the record header and bounds how
/// many differences are read. At most `req_samples` samples are returned,
/// but every difference is integrated for the XN check.
pub fn decode_steim1(
    data: &[u8],
    num_samples: usize,
    req_samples: usize,
    byte_order: ByteOrder,
) -> Result<SteimDecoded> {
    decode_frames(
        data,
        num_samples,
        req_samples,
        byte_order,
        1,
        steim1_unpack_word,
    )
}

/// Decode Steim2 compressed data.
///
/// Extends Steim1 with additional packing formats using "dnib" (bits 31-30
/// of data word). An undefined dnib is an error.
pub fn decode_steim2(
    data: &[u8],
    num_samples: usize,
    req_samples: usize,
    byte_order: ByteOrder,
) -> Result<SteimDecoded> {
    decode_frames(
        data,
        num_samples,
        req_samples,
        byte_order,
        2,
        steim2_unpack_word,
    )
}

type PackWord = fn(&[i32]) -> Result<(u32, u8, usize)>;

fn encode_frames(
    samples: &[i32],
    max_frames: usize,
    pad: bool,
    byte_order: ByteOrder,
    pack_word: PackWord,
) -> Result<SteimEncoded> {
    if samples.is_empty() {
        return Err(MseedError::EncodeError("no samples to encode".into()));
    }
    if max_frames == 0 {
        return Err(MseedError::EncodeError("no room for a Steim frame".into()));
    }

    // diffs[0] = 0, there is no previous sample to difference against
    let mut diffs = Vec::with_capacity(samples.len());
    diffs.push(0i32);
    diffs.extend(samples.windows(2).map(|w| w[1].wrapping_sub(w[0])));

    let mut frames: Vec<[u32; WORDS_PER_FRAME]> = Vec::new();
    let mut diff_idx = 0;

    while diff_idx < diffs.len() && frames.len() < max_frames {
        let is_first_frame = frames.is_empty();
        let mut frame = [0u32; WORDS_PER_FRAME];
        let mut control: u32 = 0;

        // X0 and XN are filled in once the packed count is known
        let start_word = if is_first_frame { 3 } else { 1 };

        #[allow(clippy::needless_range_loop)]
        for word_idx in start_word..WORDS_PER_FRAME {
            if diff_idx >= diffs.len() {
                break;
            }

            let (packed_word, nibble, consumed) = pack_word(&diffs[diff_idx..])?;
            frame[word_idx] = packed_word;
            control |= (nibble as u32) << (30 - word_idx * 2);
            diff_idx += consumed;
        }

        frame[0] = control;
        frames.push(frame);
    }

    let packed = diff_idx;
    frames[0][1] = samples[0] as u32;
    frames[0][2] = samples[packed - 1] as u32;

    let data_frames = frames.len();
    if pad {
        frames.resize(max_frames, [0u32; WORDS_PER_FRAME]);
    }

    let mut output = Vec::with_capacity(frames.len() * FRAME_SIZE);
    for frame in &frames {
        for &word in frame {
            match byte_order {
                ByteOrder::Big => output.extend_from_slice(&word.to_be_bytes()),
                ByteOrder::Little => output.extend_from_slice(&word.to_le_bytes()),
            }
        }
    }

    Ok(SteimEncoded {
        bytes: output,
        packed,
        frames: data_frames,
    })
}

/// Encode i32 samples using Steim1 compression into at most `max_frames`
/// frames.
///
/// Packs as many leading samples as fit and reports the count in
/// [`SteimEncoded::packed`]. With `pad`, unused frames up to `max_frames`
/// are zero-filled.
pub fn encode_steim1(
    samples: &[i32],
    max_frames: usize,
    pad: bool,
    byte_order: ByteOrder,
) -> Result<SteimEncoded> {
    encode_frames(samples, max_frames, pad, byte_order, steim1_pack_diffs)
}

/// Pack consecutive diffs into a single Steim1 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim1_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    // Try four 8-bit diffs
    if diffs.len() >= 4 && diffs[..4].iter().all(|&d| (-128..=127).contains(&d)) {
        let word = ((diffs[0] as u8 as u32) << 24)
            | ((diffs[1] as u8 as u32) << 16)
            | ((diffs[2] as u8 as u32) << 8)
            | (diffs[3] as u8 as u32);
        return Ok((word, 0b01, 4));
    }

    // Try two 16-bit diffs
    if diffs.len() >= 2 && diffs[..2].iter().all(|&d| (-32768..=32767).contains(&d)) {
        let word = ((diffs[0] as u16 as u32) << 16) | (diffs[1] as u16 as u32);
        return Ok((word, 0b10, 2));
    }

    // Fallback: one 32-bit diff
    Ok((diffs[0] as u32, 0b11, 1))
}

/// Encode i32 samples using Steim2 compression into at most `max_frames`
/// frames.
///
/// Differences must fit in 30 signed bits; a larger jump is an error.
pub fn encode_steim2(
    samples: &[i32],
    max_frames: usize,
    pad: bool,
    byte_order: ByteOrder,
) -> Result<SteimEncoded> {
    encode_frames(samples, max_frames, pad, byte_order, steim2_pack_diffs)
}

fn fits(diffs: &[i32], count: usize, bits: u32) -> bool {
    let max = (1i32 << (bits - 1)) - 1;
    let min = -(1i32 << (bits - 1));
    diffs.len() >= count && diffs[..count].iter().all(|&d| (min..=max).contains(&d))
}

fn pack_fields(diffs: &[i32], count: usize, bits: u32, dnib: u32) -> u32 {
    let mask = (1u32 << bits) - 1;
    let mut word = dnib << 30;
    for (i, &d) in diffs[..count].iter().enumerate() {
        let shift = (count - 1 - i) as u32 * bits;
        word |= ((d as u32) & mask) << shift;
    }
    word
}

/// Pack consecutive diffs into a single Steim2 word.
/// Returns (packed_word, nibble, num_consumed).
fn steim2_pack_diffs(diffs: &[i32]) -> Result<(u32, u8, usize)> {
    // 7 x 4-bit, nibble=11, dnib=10
    if fits(diffs, 7, 4) {
        return Ok((pack_fields(diffs, 7, 4, 0b10), 0b11, 7));
    }
    // 6 x 5-bit, nibble=11, dnib=01
    if fits(diffs, 6, 5) {
        return Ok((pack_fields(diffs, 6, 5, 0b01), 0b11, 6));
    }
    // 5 x 6-bit, nibble=11, dnib=00
    if fits(diffs, 5, 6) {
        return Ok((pack_fields(diffs, 5, 6, 0b00), 0b11, 5));
    }
    // 4 x 8-bit, nibble=01 (no dnib)
    if fits(diffs, 4, 8) {
        return Ok((pack_fields(diffs, 4, 8, 0b00), 0b01, 4));
    }
    // 3 x 10-bit, nibble=10, dnib=11
    if fits(diffs, 3, 10) {
        return Ok((pack_fields(diffs, 3, 10, 0b11), 0b10, 3));
    }
    // 2 x 15-bit, nibble=10, dnib=10
    if fits(diffs, 2, 15) {
        return Ok((pack_fields(diffs, 2, 15, 0b10), 0b10, 2));
    }
    // 1 x 30-bit, nibble=10, dnib=01
    if fits(diffs, 1, 30) {
        return Ok((pack_fields(diffs, 1, 30, 0b01), 0b10, 1));
    }
    Err(MseedError::EncodeError(format!(
        "difference {} exceeds the Steim2 30-bit range",
        diffs[0]
    )))
}
