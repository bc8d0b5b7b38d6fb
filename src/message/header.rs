//! Header state: target token, reply address, delivery flags
//!
//! Transport (port/messenger) berada di luar crate ini; header hanya
//! membawa token-token mentah supaya bisa di-flatten apa adanya.

/// Token kosong
pub const NULL_TOKEN: i32 = -1;
/// Token "preferred handler"
pub const PREFERRED_TOKEN: i32 = -2;

/// Alamat reply (port + target token + team)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyAddress {
    pub port: i32,
    pub target: i32,
    pub team: i32,
}

impl ReplyAddress {
    pub fn new(port: i32, target: i32, team: i32) -> Self {
        Self { port, target, team }
    }

    /// Reply info hanya di-flatten kalau ketiga bagian valid
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.port >= 0 && self.target != NULL_TOKEN && self.team >= 0
    }
}

/// Flags yang di-set oleh transport, bukan oleh codec
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryFlags {
    pub preferred: bool,
    pub reply_required: bool,
    pub reply_done: bool,
    pub is_reply: bool,
    pub was_delivered: bool,
}

/// Optional header sections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub target: Option<i32>,
    pub reply_to: Option<ReplyAddress>,
    pub delivery: DeliveryFlags,
}

impl MessageHeader {
    /// Target section ada di wire?
    #[inline(always)]
    pub fn has_target(&self) -> bool {
        matches!(self.target, Some(token) if token != NULL_TOKEN)
    }

    /// Reply section ada di wire?
    #[inline(always)]
    pub fn has_reply(&self) -> bool {
        matches!(self.reply_to, Some(address) if address.is_valid())
    }
}
