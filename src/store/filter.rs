use crate::proto::memory::Unit;
use crate::proto::{Filter, Laptop, Memory};

/// Converts a memory size to bits.
///
/// Each unit step is a factor of 1024 on top of the 8 bits in a byte.
/// Unknown units convert to zero. Values too large for `u64` saturate.
pub fn to_bits(memory: &Memory) -> u64 {
    let shift = match memory.unit() {
        Unit::Bit => 0,
        Unit::Byte => 3,
        Unit::Kilobyte => 13,
        Unit::Megabyte => 23,
        Unit::Gigabyte => 33,
        Unit::Terabyte => 43,
        Unit::Unknown => return 0,
    };

    memory.value.saturating_mul(1u64 << shift)
}

/// Returns true if `laptop` satisfies every clause of `filter`.
///
/// A zero maximum price means no price bound.
pub fn is_qualified(filter: &Filter, laptop: &Laptop) -> bool {
    if filter.max_price_usd > 0.0 && laptop.price_usd > filter.max_price_usd {
        return false;
    }

    let cpu = laptop.cpu.as_ref();
    let cores = cpu.map_or(0, |cpu| cpu.number_cores);
    if cores < filter.min_cpu_cores {
        return false;
    }

    let ghz = cpu.map_or(0.0, |cpu| cpu.min_ghz);
    if ghz < filter.min_cpu_ghz {
        return false;
    }

    let ram = laptop.ram.as_ref().map_or(0, to_bits);
    let min_ram = filter.min_ram.as_ref().map_or(0, to_bits);
    ram >= min_ram
}
