// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use criterion::{criterion_group, criterion_main, Criterion};
use picoblink_config::Variant;
use picoblink_core::bus::SystemBus;
use picoblink_core::machine::poll_config_for;
use picoblink_core::Machine;
use picoblink_poll::regs;
use std::hint::black_box;

fn machine(variant: Variant) -> Machine {
    let mut m = Machine::new(
        SystemBus::new(),
        poll_config_for(variant, regs::REFERENCE_CLOCK_HZ),
        1_000,
    );
    m.boot().unwrap();
    m
}

fn bench_poll_step(c: &mut Criterion) {
    let mut idle = machine(Variant::Echo);
    c.bench_function("echo_step_idle", |b| {
        b.iter(|| black_box(idle.step().unwrap()))
    });

    let mut busy = machine(Variant::Echo);
    c.bench_function("echo_step_with_rx", |b| {
        b.iter(|| {
            busy.push_uart_rx(b"x");
            black_box(busy.step().unwrap())
        })
    });
}

fn bench_simulated_second(c: &mut Criterion) {
    c.bench_function("burst_one_simulated_second", |b| {
        b.iter(|| {
            let mut m = machine(Variant::Burst);
            m.run_for_ms(1_000).unwrap();
            black_box(m.led_value())
        })
    });
}

criterion_group!(benches, bench_poll_step, bench_simulated_second);
criterion_main!(benches);
