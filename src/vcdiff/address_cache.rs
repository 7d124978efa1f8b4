// VCDIFF address cache (RFC 3284, Section 5.3).
//
// COPY addresses are transmitted relative to one of several reference
// points: absolute (SELF), backwards from the current position (HERE), an
// offset from a recently used address (NEAR), or an exact repeat of a
// recently used address selected by a single raw byte (SAME).

use super::error::DecodeError;
use super::varint;

// ---------------------------------------------------------------------------
// Address modes (RFC 3284 Section 5.3)
// ---------------------------------------------------------------------------

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in address space).
pub const VCD_HERE: u8 = 1;

/// Default NEAR cache size.
pub const DEFAULT_NEAR_SIZE: u8 = 4;
/// Default SAME cache size (in groups of 256 slots).
pub const DEFAULT_SAME_SIZE: u8 = 3;

/// `s_near + s_same` must leave room for SELF and HERE in a mode byte.
const MAX_CACHED_MODES: usize = 254;

// ---------------------------------------------------------------------------
// Address cache
// ---------------------------------------------------------------------------

/// NEAR/SAME address cache.
///
/// Default configuration (s_near=4, s_same=3) gives 9 address modes:
///   0      VCD_SELF  : absolute
///   1      VCD_HERE  : here - value
///   2..5   NEAR      : near\[mode-2\] + value
///   6..8   SAME      : same\[(mode-6)*256 + byte\]
#[derive(Clone, Debug)]
pub struct AddressCache {
    s_near: usize,
    s_same: usize,
    near: Vec<u64>,
    same: Vec<u64>,
    next_slot: usize,
}

impl AddressCache {
    /// Default RFC 3284 cache: s_near=4, s_same=3.
    pub fn new() -> Self {
        Self {
            s_near: DEFAULT_NEAR_SIZE as usize,
            s_same: DEFAULT_SAME_SIZE as usize,
            near: vec![0; DEFAULT_NEAR_SIZE as usize],
            same: vec![0; DEFAULT_SAME_SIZE as usize * 256],
            next_slot: 0,
        }
    }

    /// Create with the cache sizes announced alongside a custom code table.
    pub fn with_sizes(s_near: u8, s_same: u8) -> Result<Self, DecodeError> {
        let (s_near, s_same) = (s_near as usize, s_same as usize);
        if s_near + s_same > MAX_CACHED_MODES {
            return Err(DecodeError::InvalidCustomTable(format!(
                "cache sizes near={s_near} same={s_same} exceed {MAX_CACHED_MODES} modes"
            )));
        }
        Ok(Self {
            s_near,
            s_same,
            near: vec![0; s_near],
            same: vec![0; s_same * 256],
            next_slot: 0,
        })
    }

    /// Reset cache state to initial (all zeros).
    /// Called at the start of each window.
    pub fn init(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    /// Highest valid mode number (1 + s_near + s_same).
    #[inline]
    pub fn last_mode(&self) -> u8 {
        (1 + self.s_near + self.s_same) as u8
    }

    /// Number of NEAR cache slots.
    #[inline]
    pub fn s_near(&self) -> usize {
        self.s_near
    }

    /// Number of SAME cache groups.
    #[inline]
    pub fn s_same(&self) -> usize {
        self.s_same
    }

    #[inline]
    fn same_start(&self) -> usize {
        2 + self.s_near
    }

    /// Record a resolved address.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        if self.s_near > 0 {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.s_near;
        }
        if self.s_same > 0 {
            let idx = (addr % (self.s_same as u64 * 256)) as usize;
            self.same[idx] = addr;
        }
    }

    /// Resolve a COPY address.
    ///
    /// `addr_data` is the unread part of the address section and `here` the
    /// current position in the window's address space. Returns the absolute
    /// address and the number of address bytes consumed. The cache is
    /// updated only on success.
    pub fn decode(
        &mut self,
        mode: u8,
        addr_data: &[u8],
        here: u64,
    ) -> Result<(u64, usize), DecodeError> {
        let mode = mode as usize;
        let same_start = self.same_start();

        let (addr, consumed) = if mode < same_start {
            let (raw, consumed) = varint::read_u32(addr_data)
                .map_err(|e| DecodeError::from_section_varint(e, "COPY address"))?;
            let raw = u64::from(raw);

            let addr = match mode as u8 {
                VCD_SELF => raw,
                VCD_HERE => here.checked_sub(raw).ok_or_else(|| {
                    DecodeError::InvalidFormat(format!(
                        "HERE offset {raw} reaches before the start of the address space ({here})"
                    ))
                })?,
                _ => self.near[mode - 2] + raw,
            };
            (addr, consumed)
        } else if mode < same_start + self.s_same {
            let Some(&byte) = addr_data.first() else {
                return Err(DecodeError::InvalidFormat("COPY address truncated".into()));
            };
            let slot = mode - same_start;
            (self.same[slot * 256 + byte as usize], 1)
        } else {
            return Err(DecodeError::InvalidFormat(format!(
                "address mode {mode} exceeds the highest mode {}",
                self.last_mode()
            )));
        };

        if addr >= here {
            return Err(DecodeError::AddressOutOfRange { address: addr, here });
        }

        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
