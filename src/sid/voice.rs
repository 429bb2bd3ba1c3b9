/*!
One SID voice: 24-bit phase-accumulator oscillator, 23-bit noise LFSR and
the four-phase ADSR envelope generator.

Envelope timing runs in the sample domain: a fractional rate counter is
charged `clock_rate / sample_rate` per sample and reloads from the 16-entry
attack or decay/release rate tables when it runs out, stepping the 8-bit
envelope counter once per reload. The attack step size comes from the
exponential-curve table indexed by the inverted counter; a zero step stalls
the counter there, which is the hard-lock quirk of the real part.
*/

use serde::{Deserialize, Serialize};

/// PAL system clock in Hz.
pub const CLOCK_RATE: f64 = 985_248.0;
/// Host sample rate in Hz.
pub const SAMPLE_RATE: f64 = 44_100.0;

// Control register bits.
pub const CTRL_GATE: u8 = 0x01;
pub const CTRL_TRIANGLE: u8 = 0x10;
pub const CTRL_SAWTOOTH: u8 = 0x20;
pub const CTRL_PULSE: u8 = 0x40;
pub const CTRL_NOISE: u8 = 0x80;

/// Envelope rate periods in clock cycles, indexed by the attack nibble.
const ATTACK_RATES: [u32; 16] = [
    2, 8, 16, 24, 38, 56, 68, 80, 100, 250, 500, 800, 1000, 3000, 5000, 8000,
];

/// Envelope rate periods for decay and release nibbles.
const DECAY_RELEASE_RATES: [u32; 16] = [
    6, 24, 48, 72, 114, 168, 204, 240, 300, 750, 1500, 2400, 3000, 9000, 15000, 24000,
];

/// Attack step sizes approximating the exponential charge curve, indexed by
/// `envelope_counter XOR 0xFF`.
const EXPONENTIAL_STEP: [u8; 256] = [
    1, 30, 30, 30, 30, 30, 30, 16, 16, 16, 16, 16, 16, 16, 16, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeState {
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Voice {
    pub freq: u16,
    pub pulse_width: u16,
    pub control: u8,
    pub attack_decay: u8,
    pub sustain_release: u8,
    /// 24-bit phase accumulator.
    pub phase: u32,
    /// 23-bit noise shift register, taps at bits 22 and 17.
    pub noise_lfsr: u32,
    pub envelope_state: EnvelopeState,
    pub envelope_counter: u8,
    pub rate_counter: f64,
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl Voice {
    pub fn new() -> Self {
        Self {
            freq: 0,
            pulse_width: 0,
            control: 0,
            attack_decay: 0,
            sustain_release: 0,
            phase: 0,
            noise_lfsr: 0x7F_FFFF,
            envelope_state: EnvelopeState::Release,
            envelope_counter: 0,
            rate_counter: 0.0,
        }
    }

    /// Control register write with gate edge detection.
    pub fn set_control(&mut self, data: u8) {
        let was_gated = self.control & CTRL_GATE != 0;
        let gated = data & CTRL_GATE != 0;
        self.control = data;
        if gated && !was_gated {
            self.envelope_state = EnvelopeState::Attack;
        } else if !gated && was_gated {
            self.envelope_state = EnvelopeState::Release;
        }
    }

    /// Sustain target: high nibble replicated into both halves.
    fn sustain_level(&self) -> u8 {
        (self.sustain_release & 0xF0) | (self.sustain_release >> 4)
    }

    /// Advance the envelope clock by one sample period.
    pub fn tick_envelope(&mut self) {
        self.rate_counter -= CLOCK_RATE / SAMPLE_RATE;
        if self.rate_counter > 0.0 {
            return;
        }
        let reload = match self.envelope_state {
            EnvelopeState::Attack => ATTACK_RATES[(self.attack_decay >> 4) as usize],
            EnvelopeState::Decay => {
                DECAY_RELEASE_RATES[(self.attack_decay & 0x0F) as usize]
            }
            EnvelopeState::Release => {
                DECAY_RELEASE_RATES[(self.sustain_release & 0x0F) as usize]
            }
            // Holding: park the rate counter far out.
            EnvelopeState::Sustain => 0xFFFF,
        };
        self.rate_counter += reload as f64;
        self.step_envelope();
    }

    fn step_envelope(&mut self) {
        match self.envelope_state {
            EnvelopeState::Attack => {
                let step = EXPONENTIAL_STEP[(self.envelope_counter ^ 0xFF) as usize];
                if step == 0 {
                    // Hard lock: the counter stalls until the state changes.
                } else if self.envelope_counter as u16 + step as u16 >= 0xFF {
                    self.envelope_counter = 0xFF;
                    self.envelope_state = EnvelopeState::Decay;
                } else {
                    self.envelope_counter += step;
                }
            }
            EnvelopeState::Decay => {
                let sustain = self.sustain_level();
                if self.envelope_counter > sustain {
                    self.envelope_counter -= 1;
                }
                if self.envelope_counter <= sustain {
                    self.envelope_counter = sustain;
                    self.envelope_state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                // Track a lowered sustain target.
                if self.envelope_counter > self.sustain_level() {
                    self.envelope_counter -= 1;
                }
            }
            EnvelopeState::Release => {
                self.envelope_counter = self.envelope_counter.saturating_sub(1);
            }
        }
    }

    fn clock_noise(&mut self) {
        let new_bit = ((self.noise_lfsr >> 22) ^ (self.noise_lfsr >> 17)) & 1;
        self.noise_lfsr = ((self.noise_lfsr << 1) | new_bit) & 0x7F_FFFF;
    }

    /// Produce one envelope-scaled sample in [-1, 1] and advance the
    /// oscillator by one sample period.
    pub fn sample(&mut self) -> f64 {
        let step = (self.freq as f64 * 16_777_216.0 / CLOCK_RATE).round() as u32;
        let old = self.phase;
        self.phase = (self.phase.wrapping_add(step)) & 0xFF_FFFF;
        if self.control & CTRL_NOISE != 0 && self.phase < old {
            self.clock_noise();
        }

        if self.control & 0xF0 == 0 || self.envelope_counter == 0 {
            return 0.0;
        }

        // Selected waveforms combine as the AND of their 12-bit levels.
        let mut level: u16 = 0xFFF;
        if self.control & CTRL_TRIANGLE != 0 {
            let folded = if self.phase & 0x80_0000 != 0 {
                !self.phase & 0xFF_FFFF
            } else {
                self.phase
            };
            level &= ((folded >> 11) & 0xFFF) as u16;
        }
        if self.control & CTRL_SAWTOOTH != 0 {
            level &= ((self.phase >> 12) & 0xFFF) as u16;
        }
        if self.control & CTRL_PULSE != 0 {
            let high = self.phase < (self.pulse_width as u32) << 12;
            level &= if high { 0xFFF } else { 0x000 };
        }
        if self.control & CTRL_NOISE != 0 {
            level &= (((self.noise_lfsr >> 15) & 0xFF) << 4) as u16;
        }

        let wave = level as f64 / 2047.5 - 1.0;
        wave * self.envelope_counter as f64 / 255.0
    }

    /// $D41B view: top 8 bits of voice 3's accumulator.
    pub fn oscillator_msb(&self) -> u8 {
        (self.phase >> 16) as u8
    }
}
