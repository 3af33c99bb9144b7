//! Address remap applied to deferred-RAM writes.

/// Masked source/destination rewrite of a deferred address.
///
/// When enabled, an address whose masked bits equal `src` has those bits
/// replaced by `dst`; every other address passes through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DeferredRamRewriteInfo {
    src: u32,
    dst: u32,
    mask: u32,
    enabled: bool,
}

impl DeferredRamRewriteInfo {
    /// Creates a passthrough rewrite.
    #[must_use]
    pub const fn passthrough() -> Self {
        Self {
            src: 0,
            dst: 0,
            mask: 0,
            enabled: false,
        }
    }

    /// Creates a rewrite configured with [`Self::setup_rewrite_addrs`].
    #[must_use]
    pub fn new(src: i64, dst: i64, mask: u32) -> Self {
        let mut info = Self::passthrough();
        info.setup_rewrite_addrs(src, dst, mask);
        info
    }

    /// Configures the rewrite. A negative `src` or `dst` disables it.
    pub fn setup_rewrite_addrs(&mut self, src: i64, dst: i64, mask: u32) {
        match (u32::try_from(src), u32::try_from(dst)) {
            (Ok(src), Ok(dst)) => {
                self.src = src & mask;
                self.dst = dst & mask;
                self.mask = mask;
                self.enabled = true;
            }
            _ => *self = Self::passthrough(),
        }
    }

    /// Returns `true` when the rewrite can fire.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Applies the rewrite to `addr`.
    #[must_use]
    pub const fn rewrite_addr(&self, addr: u32) -> u32 {
        if self.enabled && addr & self.mask == self.src {
            (addr & !self.mask) | self.dst
        } else {
            addr
        }
    }
}
