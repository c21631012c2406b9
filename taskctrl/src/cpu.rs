//! CPU identity and purpose bookkeeping.
//!
//! Enumerating physical cores, reading APIC ids, and sending IPIs are board
//! specifics this crate never assumes — see [`CpuPlatform`]. What IS in
//! scope is the purpose map each CPU is assigned (general purpose, low
//! priority, high performance) and its reference-counted assignment rules.

use crate::sync::SpinLock;

pub const CPU_ID_NOT_FOUND: i64 = -1;
pub const CPU_ID_BOOT_PROCESSOR: i64 = 0;

/// A validated CPU index, distinct from its local APIC id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CpuId(i64);

impl CpuId {
    pub const NOT_FOUND: CpuId = CpuId(CPU_ID_NOT_FOUND);
    pub const BOOT_PROCESSOR: CpuId = CpuId(CPU_ID_BOOT_PROCESSOR);

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != CPU_ID_NOT_FOUND
    }
}

/// What a CPU is currently reserved for.
///
/// `LowPriority` is a fixed assignment: it is always the boot processor
/// (cpu 0), never handed out through [`CpuPurposeTable::retain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuPurpose {
    None,
    LowPriority,
    GeneralPurpose,
    HighPerformance,
}

pub const CPU_PURPOSES_NUM: usize = 4;

/// Platform collaborator: CPU enumeration, APIC ids, and interrupt delivery.
///
/// None of this is implemented by `taskctrl` itself — a consumer kernel
/// supplies the concrete backend (real hardware, or a test double).
pub trait CpuPlatform {
    /// The CPU this code is currently executing on.
    fn current_cpu_id(&self) -> CpuId;
    fn how_many_cpus(&self) -> usize;
    fn apic_id(&self, cpu: CpuId) -> u32;
}

/// Reference-counted purpose assignment for up to `N` CPUs.
///
/// Cpu 0 starts life pinned to `LowPriority`; every other cpu starts `None`
/// until retained for a purpose, and a purpose is only cleared once its
/// reference count drops back to zero.
pub struct CpuPurposeTable<const N: usize> {
    inner: SpinLock<[Entry; N]>,
}

#[derive(Clone, Copy)]
struct Entry {
    purpose: CpuPurpose,
    count: u32,
}

impl<const N: usize> CpuPurposeTable<N> {
    pub fn new() -> Self {
        let mut entries = [Entry {
            purpose: CpuPurpose::None,
            count: 0,
        }; N];
        if N > 0 {
            entries[CPU_ID_BOOT_PROCESSOR as usize] = Entry {
                purpose: CpuPurpose::LowPriority,
                count: 1,
            };
        }
        Self {
            inner: SpinLock::new(entries),
        }
    }

    pub fn purpose_of(&self, cpu: CpuId) -> CpuPurpose {
        self.inner.lock()[cpu.raw() as usize].purpose
    }

    /// Retains a CPU for `purpose`, picking whichever eligible CPU currently
    /// has the fewest holders of that purpose. Returns `CpuId::NOT_FOUND` if
    /// every CPU is already committed to a different purpose.
    ///
    /// `LowPriority` is never handed out this way: it always resolves to the
    /// boot processor.
    pub fn retain_for_purpose(&self, purpose: CpuPurpose) -> CpuId {
        if purpose == CpuPurpose::LowPriority {
            return CpuId::BOOT_PROCESSOR;
        }

        let mut entries = self.inner.lock();
        let mut best: Option<(usize, u32)> = None;
        for (idx, entry) in entries.iter().enumerate() {
            let eligible = entry.purpose == purpose || entry.purpose == CpuPurpose::None;
            if !eligible {
                continue;
            }
            if best.is_none_or(|(_, count)| entry.count < count) {
                best = Some((idx, entry.count));
            }
        }

        match best {
            Some((idx, _)) => {
                let entry = &mut entries[idx];
                if entry.purpose != purpose {
                    entry.purpose = purpose;
                    entry.count = 0;
                }
                entry.count += 1;
                CpuId::new(idx as i64)
            }
            None => CpuId::NOT_FOUND,
        }
    }

    /// Releases one hold on `cpu`'s current purpose; clears it back to
    /// `None` once the count reaches zero.
    pub fn release(&self, cpu: CpuId) {
        let mut entries = self.inner.lock();
        let entry = &mut entries[cpu.raw() as usize];
        if entry.purpose == CpuPurpose::LowPriority {
            return;
        }
        assert!(entry.count > 0, "CpuPurposeTable: release without a matching retain");
        entry.count -= 1;
        if entry.count == 0 {
            entry.purpose = CpuPurpose::None;
        }
    }

    /// Assigns every still-unassigned CPU to `GeneralPurpose`.
    pub fn assign_unassigned_to_general_purpose(&self) {
        let mut entries = self.inner.lock();
        for entry in entries.iter_mut() {
            if entry.purpose == CpuPurpose::None {
                entry.purpose = CpuPurpose::GeneralPurpose;
                entry.count = 1;
            }
        }
    }
}

impl<const N: usize> Default for CpuPurposeTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_cpu_is_low_priority() {
        let table: CpuPurposeTable<4> = CpuPurposeTable::new();
        assert_eq!(table.purpose_of(CpuId::BOOT_PROCESSOR), CpuPurpose::LowPriority);
    }

    #[test]
    fn low_priority_always_resolves_to_boot_cpu() {
        let table: CpuPurposeTable<4> = CpuPurposeTable::new();
        assert_eq!(
            table.retain_for_purpose(CpuPurpose::LowPriority),
            CpuId::BOOT_PROCESSOR
        );
    }

    #[test]
    fn retain_prefers_least_loaded_cpu() {
        let table: CpuPurposeTable<4> = CpuPurposeTable::new();
        let a = table.retain_for_purpose(CpuPurpose::GeneralPurpose);
        let b = table.retain_for_purpose(CpuPurpose::GeneralPurpose);
        assert_ne!(a, b);
        assert_ne!(a, CpuId::BOOT_PROCESSOR);
        assert_ne!(b, CpuId::BOOT_PROCESSOR);
    }

    #[test]
    fn release_clears_purpose_at_zero_refcount() {
        let table: CpuPurposeTable<4> = CpuPurposeTable::new();
        let cpu = table.retain_for_purpose(CpuPurpose::HighPerformance);
        table.release(cpu);
        assert_eq!(table.purpose_of(cpu), CpuPurpose::None);
    }
}
