//! The four 16-bit timers.
//!
//! Each timer has a counter, a reload latch and a control halfword
//! (prescaler code, cascade, IRQ enable, enable). A timer either absorbs
//! system ticks through its prescaler or, with cascade set, advances once
//! per overflow of the previous timer. On overflow the counter reloads and
//! optionally requests IF bit `3 + n`.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;

/// Prescaler codes 0..3 select 1, 64, 256 or 1024 cycles per tick.
const PRESCALER_SHIFTS: [u32; 4] = [0, 6, 8, 10];

#[derive(Default, Serialize, Deserialize)]
pub struct Timers {
    counter: [u16; 4],
    reload: [u16; 4],
    control: [u16; 4],
    prescaler: [u32; 4],
}

/// IRQ requests produced by one `step`, one bit per timer.
#[derive(Default, Debug, Clone, Copy)]
pub struct TimersStepOutput {
    pub irq_requests: u8,
}

impl TimersStepOutput {
    #[must_use]
    pub const fn requests_irq(self, timer: usize) -> bool {
        self.irq_requests & (1 << timer) != 0
    }
}

impl Timers {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Absorbs `cycles` system ticks into every running, non-cascaded
    /// timer. Cascaded timers only move through overflows of their
    /// predecessor.
    pub fn step(&mut self, cycles: u32) -> TimersStepOutput {
        let mut output = TimersStepOutput::default();

        for i in 0..4 {
            if !self.control[i].get_bit(7) {
                continue;
            }

            let cascade = self.control[i].get_bit(2) && i > 0;
            if cascade {
                continue;
            }

            self.prescaler[i] += cycles;

            let ticks_needed = 1 << PRESCALER_SHIFTS[(self.control[i] & 0b11) as usize];
            while self.prescaler[i] >= ticks_needed {
                self.prescaler[i] -= ticks_needed;
                self.tick(i, &mut output);
            }
        }

        output
    }

    fn tick(&mut self, timer: usize, output: &mut TimersStepOutput) {
        self.counter[timer] = self.counter[timer].wrapping_add(1);

        if self.counter[timer] == 0 {
            self.overflow(timer, output);
        }
    }

    fn overflow(&mut self, timer: usize, output: &mut TimersStepOutput) {
        self.counter[timer] = self.reload[timer];

        if self.control[timer].get_bit(6) {
            output.irq_requests |= 1 << timer;
        }

        // An overflow feeds exactly one tick into a cascaded successor.
        if timer < 3 {
            let next = timer + 1;
            if self.control[next].get_bit(2) && self.control[next].get_bit(7) {
                self.tick(next, output);
            }
        }
    }

    /// TMxCNT_L reads return the live counter, not the reload latch.
    #[must_use]
    pub const fn read_counter(&self, timer: usize) -> u16 {
        self.counter[timer]
    }

    #[must_use]
    pub const fn read_control(&self, timer: usize) -> u16 {
        self.control[timer]
    }

    /// TMxCNT_L writes update the reload latch only; the counter picks it
    /// up on the next enable edge or overflow.
    pub const fn write_reload(&mut self, timer: usize, value: u16) {
        self.reload[timer] = value;
    }

    pub fn write_control(&mut self, timer: usize, value: u16) {
        let was_enabled = self.control[timer].get_bit(7);
        let now_enabled = value.get_bit(7);

        if !was_enabled && now_enabled {
            self.counter[timer] = self.reload[timer];
            self.prescaler[timer] = 0;
        }

        self.control[timer] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENABLE: u16 = 1 << 7;
    const IRQ: u16 = 1 << 6;
    const CASCADE: u16 = 1 << 2;

    #[test]
    fn enable_edge_loads_reload() {
        let mut timers = Timers::default();
        timers.write_reload(0, 0x1234);
        assert_eq!(timers.read_counter(0), 0);

        timers.write_control(0, ENABLE);
        assert_eq!(timers.read_counter(0), 0x1234);

        // Re-writing control without an edge must not reload.
        timers.step(3);
        timers.write_control(0, ENABLE);
        assert_eq!(timers.read_counter(0), 0x1237);
    }

    #[test]
    fn prescaler_divides_ticks() {
        let mut timers = Timers::default();
        timers.write_control(0, ENABLE | 0b01); // 64 cycles per tick

        timers.step(63);
        assert_eq!(timers.read_counter(0), 0);

        timers.step(1);
        assert_eq!(timers.read_counter(0), 1);

        timers.step(128);
        assert_eq!(timers.read_counter(0), 3);
    }

    #[test]
    fn overflow_reloads_and_requests_irq() {
        let mut timers = Timers::default();
        timers.write_reload(0, 0xFFFE);
        timers.write_control(0, ENABLE | IRQ);

        let out = timers.step(1);
        assert!(!out.requests_irq(0));

        let out = timers.step(1);
        assert!(out.requests_irq(0));
        assert_eq!(timers.read_counter(0), 0xFFFE);
    }

    #[test]
    fn cascade_advances_on_overflow_only() {
        let mut timers = Timers::default();
        timers.write_reload(0, 0xFFFF);
        timers.write_control(0, ENABLE);
        timers.write_reload(1, 0);
        timers.write_control(1, ENABLE | CASCADE | IRQ);

        // Two base steps: T0 overflows twice, T1 counts two.
        let out = timers.step(1);
        assert!(!out.requests_irq(1));
        assert_eq!(timers.read_counter(1), 1);

        timers.step(1);
        assert_eq!(timers.read_counter(1), 2);

        // T1 itself never moves from raw cycles.
        let mut timers = Timers::default();
        timers.write_control(1, ENABLE | CASCADE);
        timers.step(1000);
        assert_eq!(timers.read_counter(1), 0);
    }

    #[test]
    fn cascade_overflow_raises_if_bit() {
        let mut timers = Timers::default();
        timers.write_reload(0, 0xFFFF);
        timers.write_control(0, ENABLE);
        timers.write_reload(1, 0xFFFF);
        timers.write_control(1, ENABLE | CASCADE | IRQ);

        let out = timers.step(1);
        assert!(out.requests_irq(1));
        assert_eq!(timers.read_counter(1), 0xFFFF);
    }
}
