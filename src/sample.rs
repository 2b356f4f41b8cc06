use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

use crate::proto::memory::Unit;
use crate::proto::screen::{Panel, Resolution};
use crate::proto::storage::Driver;
use crate::proto::{Cpu, Gpu, Laptop, Memory, Screen, Storage};

/// Returns a random laptop with a fresh ID.
pub fn new_laptop() -> Laptop {
    let mut rng = rand::thread_rng();
    let &(brand, names) = pick(&mut rng, LAPTOP_MODELS);

    Laptop {
        id: Uuid::new_v4().to_string(),
        brand: brand.to_string(),
        name: pick(&mut rng, names).to_string(),
        cpu: Some(new_cpu(&mut rng)),
        ram: Some(memory(rng.gen_range(4..=64), Unit::Gigabyte)),
        gpus: vec![new_gpu(&mut rng)],
        storages: vec![
            Storage {
                driver: Driver::Ssd as i32,
                memory: Some(memory(rng.gen_range(128..=1024), Unit::Gigabyte)),
            },
            Storage {
                driver: Driver::Hdd as i32,
                memory: Some(memory(rng.gen_range(1..=6), Unit::Terabyte)),
            },
        ],
        screen: Some(new_screen(&mut rng)),
        weight_kg: rng.gen_range(1.0..3.0),
        price_usd: rng.gen_range(1500.0..3500.0),
        release_year: rng.gen_range(2015..=2024),
        updated_at: unix_seconds(),
    }
}

/// Returns a whole-number score between 1 and 10.
pub fn random_score() -> f64 {
    f64::from(rand::thread_rng().gen_range(1..=10u8))
}

const LAPTOP_MODELS: &[(&str, &[&str])] = &[
    ("Apple", &["Macbook Air", "Macbook Pro"]),
    ("Dell", &["Latitude", "Vostro", "XPS", "Alienware"]),
    ("Lenovo", &["Thinkpad X1", "Thinkpad P1", "Thinkpad P53"]),
];

const CPU_MODELS: &[(&str, &[&str])] = &[
    ("Intel", &["Xeon E-2286M", "Core i9-9980HK", "Core i7-9750H", "Core i5-9400F"]),
    ("AMD", &["Ryzen 7 PRO 2700U", "Ryzen 5 PRO 3500U", "Ryzen 3 PRO 3200GE"]),
];

const GPU_MODELS: &[(&str, &[&str])] = &[
    ("NVIDIA", &["RTX 2060", "RTX 2070", "GTX 1660-Ti", "GTX 1070"]),
    ("AMD", &["RX 590", "RX 580", "RX 5700-XT", "RX Vega-56"]),
];

fn new_cpu(rng: &mut impl Rng) -> Cpu {
    let &(brand, names) = pick(rng, CPU_MODELS);
    let number_cores = rng.gen_range(2..=8);
    let min_ghz = rng.gen_range(2.0..3.5);

    Cpu {
        brand: brand.to_string(),
        name: pick(rng, names).to_string(),
        number_cores,
        number_threads: rng.gen_range(number_cores..=12),
        min_ghz,
        max_ghz: rng.gen_range(min_ghz..5.0),
    }
}

fn new_gpu(rng: &mut impl Rng) -> Gpu {
    let &(brand, names) = pick(rng, GPU_MODELS);
    let min_ghz = rng.gen_range(1.0..1.5);

    Gpu {
        brand: brand.to_string(),
        name: pick(rng, names).to_string(),
        min_ghz,
        max_ghz: rng.gen_range(min_ghz..2.0),
        memory: Some(memory(rng.gen_range(2..=6), Unit::Gigabyte)),
    }
}

fn new_screen(rng: &mut impl Rng) -> Screen {
    let height = rng.gen_range(1080..=4320);
    let width = height * 16 / 9;
    let panel = if rng.gen_bool(0.5) { Panel::Ips } else { Panel::Oled };

    Screen {
        size_inch: rng.gen_range(13.0..17.0),
        resolution: Some(Resolution { width, height }),
        panel: panel as i32,
        multitouch: rng.gen_bool(0.5),
    }
}

fn memory(value: u64, unit: Unit) -> Memory {
    Memory {
        value,
        unit: unit as i32,
    }
}

// Every table above is non-empty.
fn pick<'a, T>(rng: &mut impl Rng, items: &'a [T]) -> &'a T {
    items.choose(rng).unwrap_or(&items[0])
}

fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
