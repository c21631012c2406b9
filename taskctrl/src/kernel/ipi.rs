//! [`crate::ipi::IpiControl`] backed by a real Local APIC.

use crate::cpu::CpuId;
use crate::ipi::IpiControl;

/// Sends a fixed-mode IPI on `vector` to wake a parked CPU.
///
/// `apic_id_of` maps a [`CpuId`] to the target's Local APIC id — the
/// consumer kernel already has this mapping from bringing its cores up, so
/// it's supplied rather than re-derived here (see `crate::cpu::CpuPlatform`).
pub struct ApicIpiControl<F: Fn(CpuId) -> u32> {
    apic_id_of: F,
    vector: u8,
}

impl<F: Fn(CpuId) -> u32> ApicIpiControl<F> {
    pub const fn new(apic_id_of: F, vector: u8) -> Self {
        Self { apic_id_of, vector }
    }
}

impl<F: Fn(CpuId) -> u32> IpiControl for ApicIpiControl<F> {
    fn send_ipi(&self, target: CpuId) {
        khal::apic::send_ipi((self.apic_id_of)(target), self.vector);
    }
}
