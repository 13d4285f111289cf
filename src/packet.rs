//! Input packet codec: encodes/decodes one player's run of consecutive
//! frames as a compact toggle stream.
//!
//! # Wire format
//!
//! Little-endian, one player per packet.
//!
//! - Header, 8 bytes: `player_id: u16 | anchor_frame: u16 | frame_count: u16 | anchor_checksum: u16`.
//! - Body: one frame-block per frame, oldest to newest. Each block is the
//!   XOR-delta between that frame's [`InputTokenSet`] and the next older
//!   frame's (the oldest frame deltas against the empty set), written as
//!   zero or more continuation bytes `0x80 | token` — one per toggled token,
//!   ascending — followed by exactly one terminator byte `0x00`.
//!
//! This scheme is streamable (a decoder never needs to look ahead) and
//! compresses runs of unchanging input to a single terminator byte per
//! frame, which is the common case for a fighting-game-style input stream.

use crate::error::{MalformedPacketReason, RollbackError, RollbackResult};
use crate::ids::FrameIndex;
use crate::token_set::InputTokenSet;

const HEADER_LEN: usize = 8;
const CONTINUE_BIT: u8 = 0x80;
const TOKEN_MASK: u8 = 0x7F;

/// A decoded packet: the player it belongs to, the frames it covers, and the
/// anchor frame's authoritative checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    /// The player these inputs belong to.
    pub player_id: u16,
    /// The newest frame described by the packet.
    pub anchor_frame: FrameIndex,
    /// `frames[0]` is the oldest frame (`anchor_frame - frames.len() + 1`),
    /// `frames.last()` is `anchor_frame`.
    pub frames: Vec<InputTokenSet>,
    /// The anchor frame's authoritative checksum.
    pub anchor_checksum: u16,
}

impl DecodedPacket {
    /// The oldest frame described by the packet.
    #[must_use]
    pub fn oldest_frame(&self) -> FrameIndex {
        self.anchor_frame.wrapping_sub(self.frames.len() as u16 - 1)
    }
}

/// Encodes `frames` (oldest to newest, `frames.last()` == the anchor frame)
/// into a wire packet.
///
/// # Panics
///
/// Never panics; an empty `frames` slice produces a packet whose header
/// claims `frame_count = 0`, which [`decode_packet`] rejects as malformed —
/// callers should not pass an empty slice.
#[must_use]
pub fn encode_packet(
    player_id: u16,
    anchor_frame: FrameIndex,
    anchor_checksum: u16,
    frames: &[InputTokenSet],
) -> Vec<u8> {
    let frame_count = frames.len() as u16;
    let mut out = Vec::with_capacity(HEADER_LEN + frames.len() * 2);
    out.extend_from_slice(&player_id.to_le_bytes());
    out.extend_from_slice(&anchor_frame.as_u16().to_le_bytes());
    out.extend_from_slice(&frame_count.to_le_bytes());
    out.extend_from_slice(&anchor_checksum.to_le_bytes());

    let mut previous = InputTokenSet::EMPTY;
    for &frame in frames {
        let delta = frame ^ previous;
        encode_block(delta, &mut out);
        previous = frame;
    }
    out
}

fn encode_block(delta: InputTokenSet, out: &mut Vec<u8>) {
    for token in delta.iter() {
        out.push(CONTINUE_BIT | (token & TOKEN_MASK));
    }
    out.push(0x00);
}

/// Decodes a wire packet produced by [`encode_packet`].
///
/// # Errors
///
/// Returns [`RollbackError::Malformed`] if the buffer is shorter than the
/// header, the header claims zero frames, the body ends mid-frame, or a
/// decoded token exceeds the valid `0..=127` domain.
pub fn decode_packet(bytes: &[u8]) -> RollbackResult<DecodedPacket> {
    if bytes.len() < HEADER_LEN {
        return Err(RollbackError::Malformed(MalformedPacketReason::TruncatedHeader));
    }
    let player_id = u16::from_le_bytes([bytes[0], bytes[1]]);
    let anchor_frame = FrameIndex::new(u16::from_le_bytes([bytes[2], bytes[3]]));
    let frame_count = u16::from_le_bytes([bytes[4], bytes[5]]);
    let anchor_checksum = u16::from_le_bytes([bytes[6], bytes[7]]);

    if frame_count == 0 {
        return Err(RollbackError::Malformed(MalformedPacketReason::EmptyFrameCount));
    }

    let mut body = bytes[HEADER_LEN..].iter().copied();
    let mut previous = InputTokenSet::EMPTY;
    let mut frames = Vec::with_capacity(frame_count as usize);

    for _ in 0..frame_count {
        let delta = decode_block(&mut body)?;
        let current = delta ^ previous;
        frames.push(current);
        previous = current;
    }

    Ok(DecodedPacket {
        player_id,
        anchor_frame,
        frames,
        anchor_checksum,
    })
}

fn decode_block(body: &mut impl Iterator<Item = u8>) -> RollbackResult<InputTokenSet> {
    let mut set = InputTokenSet::EMPTY;
    loop {
        let byte = body
            .next()
            .ok_or(RollbackError::Malformed(MalformedPacketReason::TruncatedBody))?;
        let token = byte & TOKEN_MASK;
        if !InputTokenSet::is_valid_token(token) {
            return Err(RollbackError::Malformed(MalformedPacketReason::TokenOutOfRange { byte }));
        }
        let continues = byte & CONTINUE_BIT != 0;
        if continues {
            set.insert(token);
        } else {
            break;
        }
    }
    Ok(set)
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_token_set() -> impl Strategy<Value = InputTokenSet> {
        proptest::collection::vec(0u8..=127, 0..6).prop_map(InputTokenSet::from_tokens)
    }

    proptest! {
        #[test]
        fn decode_of_encode_is_identity(
            player_id in any::<u16>(),
            anchor in any::<u16>(),
            checksum in any::<u16>(),
            frames in proptest::collection::vec(arb_token_set(), 1..12),
        ) {
            let encoded = encode_packet(player_id, FrameIndex::new(anchor), checksum, &frames);
            let decoded = decode_packet(&encoded).expect("well-formed packet must decode");
            prop_assert_eq!(decoded.player_id, player_id);
            prop_assert_eq!(decoded.anchor_frame, FrameIndex::new(anchor));
            prop_assert_eq!(decoded.anchor_checksum, checksum);
            prop_assert_eq!(decoded.frames, frames);
        }
    }
}
