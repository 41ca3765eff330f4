//! Ch10 time correlation: RTC pairs, intra-packet timestamps, and the
//! TDP-anchored conversion to absolute nanoseconds since the Unix epoch.

use crate::element::ByteCursor;
use crate::error::{Ch10Error, Result};

/// One 100 ns tick of the 48-bit Ch10 relative time counter.
pub const RTC_TICK_NS: u64 = 100;

/// `2^48` ticks, i.e. the point at which the 48-bit RTC counter wraps.
const RTC_MODULUS: u64 = 1u64 << 48;

/// Recognized intra-packet timestamp source values (packet-header `ipts_source`
/// field): RTC-from-header, or IPTS-from-body in one of two formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IptsSource {
    /// Timestamp is the packet header's own RTC pair; no body bytes consumed.
    Header,
    /// Timestamp is read from the packet body in IRIG-B day-of-year format.
    BodyDayOfYear,
    /// Timestamp is read from the packet body as a raw RTC pair.
    BodyRtc,
}

/// Combine the low 32 bits and high 16 bits of a 48-bit RTC counter into a
/// single tick count.
pub fn combine_rtc(rtc_low: u32, rtc_high: u32) -> u64 {
    (((rtc_high & 0xFFFF) as u64) << 32) | rtc_low as u64
}

/// Parse an 8-byte intra-packet timestamp from the body, honoring `src`.
/// `Header` sources consume nothing (the caller already has the header's
/// RTC pair); body sources consume exactly 8 bytes.
pub fn parse_ipts(cursor: &mut ByteCursor<'_>, src: IptsSource) -> Result<u64> {
    match src {
        IptsSource::Header => Ok(0),
        IptsSource::BodyRtc => {
            let low = cursor.read_le_u32()?;
            let high = cursor.read_le_u32()? & 0xFFFF;
            Ok(combine_rtc(low, high) * RTC_TICK_NS)
        }
        IptsSource::BodyDayOfYear => {
            let bytes = cursor.read_array::<8>()?;
            Ok(parse_irigb_day_of_year(&bytes))
        }
    }
}

/// Decode an 8-byte IRIG-B day-of-year packed-BCD timestamp into
/// nanoseconds since that year began. Packed as: day(3 BCD digits),
/// hour/min/sec/ms in BCD nibble pairs, matching the packed-BCD layout
/// Time-F1 packets use (see [`crate::components::timef1`]).
pub fn parse_irigb_day_of_year(bytes: &[u8; 8]) -> u64 {
    fn bcd(byte: u8) -> u64 {
        ((byte >> 4) as u64) * 10 + (byte & 0x0F) as u64
    }
    let day = bcd(bytes[0]) * 100 + bcd(bytes[1]);
    let hour = bcd(bytes[2]);
    let minute = bcd(bytes[3]);
    let second = bcd(bytes[4]);
    let millis = bcd(bytes[5]) * 10 + (bytes[6] >> 4) as u64;

    let secs = day.saturating_sub(1) * 86_400 + hour * 3_600 + minute * 60 + second;
    secs * 1_000_000_000 + millis * 1_000_000
}

/// Per-worker TDP (Time Data Packet) seeding state. Settled once, by the
/// first successfully decoded Time-F1 packet; everything timestamped
/// before that point must be deferred to the manager's append pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct TdpState {
    has_seen_tdp: bool,
    anchor_rtc_ticks: u64,
    anchor_abs_ns: u64,
}

impl TdpState {
    /// Seed (or re-seed) the anchor from a newly decoded TDP. Drift
    /// correction across repeated TDPs is out of scope; the latest TDP
    /// simply replaces the anchor.
    pub fn seed(&mut self, rtc_ticks: u64, abs_ns: u64) {
        self.has_seen_tdp = true;
        self.anchor_rtc_ticks = rtc_ticks;
        self.anchor_abs_ns = abs_ns;
    }

    /// Whether a TDP has been observed yet in this worker.
    pub fn is_settled(&self) -> bool {
        self.has_seen_tdp
    }

    /// The `(rtc_ticks, abs_ns)` anchor pair, once settled. Used by the
    /// manager to seed append-pass workers with the anchor the initial
    /// pass discovered.
    pub fn anchor(&self) -> Option<(u64, u64)> {
        self.has_seen_tdp
            .then_some((self.anchor_rtc_ticks, self.anchor_abs_ns))
    }

    /// Convert an RTC-tick-derived IPTS (already in nanoseconds) to
    /// absolute nanoseconds since the Unix epoch, anchored at the last
    /// seeded TDP. Deltas are computed modulo the 48-bit RTC's nanosecond
    /// range so that a wraparound just after the anchor does not appear
    /// as a huge negative delta.
    pub fn ipts_to_abs_ns(&self, ipts_ns: u64) -> Result<u64> {
        if !self.has_seen_tdp {
            return Err(Ch10Error::ConfigError(
                "ipts_to_abs_ns called before TDP anchor settled".into(),
            ));
        }
        let modulus_ns = RTC_MODULUS * RTC_TICK_NS;
        let anchor_ns = self.anchor_rtc_ticks * RTC_TICK_NS;
        let delta = (ipts_ns + modulus_ns - anchor_ns % modulus_ns) % modulus_ns;
        Ok(self.anchor_abs_ns.wrapping_add(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_rtc_matches_formula_for_all_valid_high_words() {
        for h in [0u32, 1, 0xFFFF] {
            let l = 0xDEAD_BEEFu32;
            assert_eq!(combine_rtc(l, h), ((h as u64) << 32) | l as u64);
        }
    }

    #[test]
    fn combine_rtc_masks_high_bits_above_16() {
        assert_eq!(combine_rtc(0, 0x1_FFFF), 0xFFFF << 32);
    }

    #[test]
    fn ipts_to_abs_ns_requires_settled_anchor() {
        let state = TdpState::default();
        assert!(state.ipts_to_abs_ns(1_000).is_err());
    }

    #[test]
    fn ipts_to_abs_ns_is_anchor_relative() {
        let mut state = TdpState::default();
        state.seed(1_000_000, 1_700_000_000_000_000_000);
        let later = state.ipts_to_abs_ns(1_000_000 + 500_000).unwrap();
        assert_eq!(later, 1_700_000_000_000_000_000 + 500_000);
    }

    #[test]
    fn ipts_to_abs_ns_handles_rtc_wraparound() {
        let mut state = TdpState::default();
        let modulus = RTC_MODULUS * RTC_TICK_NS;
        state.seed(RTC_MODULUS - 10, 1_000_000_000);
        // ipts wraps past the 48-bit modulus boundary by 5 ticks
        let wrapped_ipts = (5u64 * RTC_TICK_NS) % modulus;
        let abs = state.ipts_to_abs_ns(wrapped_ipts).unwrap();
        assert_eq!(abs, 1_000_000_000 + 15 * RTC_TICK_NS);
    }
}
