/*!
MOS 6581 SID: three voices, the digital state-variable filter approximation
and the mixer.

Audio is pulled at frame boundaries: `render` fills a signed-16-bit mono
buffer, advancing each voice's envelope clock once per sample using the
CPU-clock to sample-rate ratio. Of the 32 registers only the voice-3
oscillator MSB ($1B) and envelope counter ($1C) read live values; everything
else reads back the last written byte.

Filter: per sample `lp += f·bp; hp = in − lp − q·bp; bp += f·hp` with
`f = 2·sin(π · cutoff/2047 · 11000 / sample_rate)` and `q = 1 − resonance`.
Voices route into the filter by the $D417 low-nibble mask; the rest bypass.
*/

mod voice;

pub use voice::{EnvelopeState, SAMPLE_RATE, Voice};

use serde::{Deserialize, Serialize};

const REG_COUNT: usize = 32;

pub struct Sid {
    regs: [u8; REG_COUNT],
    voices: [Voice; 3],
    /// Master volume in [0, 1].
    volume: f64,
    /// 11-bit filter cutoff.
    cutoff: u16,
    /// Resonance in [0, 1].
    resonance: f64,
    /// Per-voice filter routing mask (bits 0..2).
    route: u8,
    /// Mode bits of $D418 (bit 4 low-pass, 5 band-pass, 6 high-pass).
    mode: u8,
    voice3_off: bool,
    low_pass: f64,
    band_pass: f64,
}

impl Default for Sid {
    fn default() -> Self {
        Self::new()
    }
}

impl Sid {
    pub fn new() -> Self {
        Self {
            regs: [0; REG_COUNT],
            voices: [Voice::new(), Voice::new(), Voice::new()],
            volume: 0.0,
            cutoff: 0,
            resonance: 0.0,
            route: 0,
            mode: 0,
            voice3_off: false,
            low_pass: 0.0,
            band_pass: 0.0,
        }
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr & 0x1F {
            0x1B => self.voices[2].oscillator_msb(),
            0x1C => self.voices[2].envelope_counter,
            offset => self.regs[offset as usize],
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        let offset = (addr & 0x1F) as usize;
        self.regs[offset] = data;
        match offset {
            0x00..=0x06 => self.write_voice(0, offset, data),
            0x07..=0x0D => self.write_voice(1, offset - 0x07, data),
            0x0E..=0x14 => self.write_voice(2, offset - 0x0E, data),
            0x15 => self.cutoff = (self.cutoff & 0x07F8) | (data & 0x07) as u16,
            0x16 => self.cutoff = (self.cutoff & 0x0007) | ((data as u16) << 3),
            0x17 => {
                self.resonance = (data >> 4) as f64 / 15.0;
                self.route = data & 0x0F;
            }
            0x18 => {
                self.volume = (data & 0x0F) as f64 / 15.0;
                self.mode = data & 0x70;
                self.voice3_off = data & 0x80 != 0;
            }
            _ => {}
        }
    }

    fn write_voice(&mut self, index: usize, reg: usize, data: u8) {
        let v = &mut self.voices[index];
        match reg {
            0 => v.freq = (v.freq & 0xFF00) | data as u16,
            1 => v.freq = (v.freq & 0x00FF) | ((data as u16) << 8),
            2 => v.pulse_width = (v.pulse_width & 0x0F00) | data as u16,
            3 => v.pulse_width = (v.pulse_width & 0x00FF) | (((data & 0x0F) as u16) << 8),
            4 => v.set_control(data),
            5 => v.attack_decay = data,
            6 => v.sustain_release = data,
            _ => {}
        }
    }

    /// Fill `out` with mono samples, advancing the chip sample by sample.
    pub fn render(&mut self, out: &mut [i16]) {
        let cutoff_norm = self.cutoff as f64 / 2047.0;
        let f = 2.0 * (std::f64::consts::PI * cutoff_norm * 11_000.0 / SAMPLE_RATE).sin();
        let q = 1.0 - self.resonance;
        let amplitude = 32_767.0 * self.volume / 3.0;

        for sample in out.iter_mut() {
            for v in &mut self.voices {
                v.tick_envelope();
            }
            let mut outs = [
                self.voices[0].sample(),
                self.voices[1].sample(),
                self.voices[2].sample(),
            ];
            if self.voice3_off {
                outs[2] = 0.0;
            }

            let mut filter_in = 0.0;
            let mut bypass = 0.0;
            for (i, v) in outs.iter().enumerate() {
                if self.route & (1 << i) != 0 {
                    filter_in += v;
                } else {
                    bypass += v;
                }
            }

            self.low_pass += f * self.band_pass;
            let high_pass = filter_in - self.low_pass - q * self.band_pass;
            self.band_pass += f * high_pass;

            let mut filtered = 0.0;
            if self.mode & 0x10 != 0 {
                filtered += self.low_pass;
            }
            if self.mode & 0x20 != 0 {
                filtered += self.band_pass;
            }
            if self.mode & 0x40 != 0 {
                filtered += high_pass;
            }

            let mix = (filtered + bypass) * amplitude;
            *sample = mix.clamp(-32_768.0, 32_767.0) as i16;
        }
    }

    pub fn snapshot(&self) -> SidSnapshot {
        SidSnapshot {
            regs: self.regs.to_vec(),
            voices: self.voices.to_vec(),
            volume: self.volume,
            cutoff: self.cutoff,
            resonance: self.resonance,
            route: self.route,
            mode: self.mode,
            voice3_off: self.voice3_off,
            low_pass: self.low_pass,
            band_pass: self.band_pass,
        }
    }

    pub fn restore(&mut self, snap: &SidSnapshot) {
        let n = snap.regs.len().min(REG_COUNT);
        self.regs[..n].copy_from_slice(&snap.regs[..n]);
        for (i, v) in snap.voices.iter().take(3).enumerate() {
            self.voices[i] = v.clone();
        }
        self.volume = snap.volume;
        self.cutoff = snap.cutoff;
        self.resonance = snap.resonance;
        self.route = snap.route;
        self.mode = snap.mode;
        self.voice3_off = snap.voice3_off;
        self.low_pass = snap.low_pass;
        self.band_pass = snap.band_pass;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SidSnapshot {
    pub regs: Vec<u8>,
    pub voices: Vec<Voice>,
    pub volume: f64,
    pub cutoff: u16,
    pub resonance: f64,
    pub route: u8,
    pub mode: u8,
    pub voice3_off: bool,
    pub low_pass: f64,
    pub band_pass: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_sid() -> Sid {
        let mut sid = Sid::new();
        sid.write(0xD418, 0x0F); // full volume, no filter
        sid.write(0xD400, 0x00); // voice 1 freq = $1000
        sid.write(0xD401, 0x10);
        sid.write(0xD405, 0x00); // fastest attack/decay
        sid.write(0xD406, 0xF0); // sustain full
        sid.write(0xD404, 0x11); // triangle + gate
        sid
    }

    #[test]
    fn register_readback_returns_last_write() {
        let mut sid = Sid::new();
        sid.write(0xD405, 0xA9);
        assert_eq!(sid.read(0xD405), 0xA9);
        sid.write(0xD417, 0xF7);
        assert_eq!(sid.read(0xD417), 0xF7);
    }

    #[test]
    fn voice3_taps_read_live_state() {
        let mut sid = Sid::new();
        sid.write(0xD40E, 0xFF); // voice 3 freq
        sid.write(0xD40F, 0xFF);
        sid.write(0xD412, 0x21); // sawtooth + gate
        sid.write(0xD418, 0x0F);
        let mut buf = [0i16; 256];
        sid.render(&mut buf);
        assert_ne!(sid.read(0xD41B), 0); // oscillator has advanced
        assert_ne!(sid.read(0xD41C), 0); // envelope is charging
    }

    #[test]
    fn triangle_tone_has_the_programmed_period() {
        let mut sid = triangle_sid();
        let mut buf = vec![0i16; 1470]; // two frames of audio
        sid.render(&mut buf);

        // Expected period: 2^24 / round(0x1000 * 2^24 / clock) ~ 240.5
        // samples. Measure rising zero crossings after the envelope settles.
        let mut crossings = Vec::new();
        for i in 400..buf.len() {
            if buf[i - 1] < 0 && buf[i] >= 0 {
                crossings.push(i);
            }
        }
        assert!(crossings.len() >= 3, "expected a periodic tone");
        let spans: Vec<usize> = crossings.windows(2).map(|w| w[1] - w[0]).collect();
        let mean = spans.iter().sum::<usize>() as f64 / spans.len() as f64;
        assert!(
            (mean - 240.5).abs() < 8.0,
            "triangle period {mean} samples, expected ~240.5"
        );
    }

    #[test]
    fn silence_without_gate_or_volume() {
        let mut sid = Sid::new();
        sid.write(0xD400, 0x00);
        sid.write(0xD401, 0x10);
        sid.write(0xD404, 0x10); // triangle, no gate
        let mut buf = [0i16; 64];
        sid.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn voice3_off_mutes_the_third_voice() {
        let mut sid = Sid::new();
        sid.write(0xD40E, 0x00);
        sid.write(0xD40F, 0x10);
        sid.write(0xD413, 0x00);
        sid.write(0xD414, 0xF0);
        sid.write(0xD412, 0x21); // saw + gate
        sid.write(0xD418, 0x8F); // volume + 3OFF
        let mut buf = [0i16; 512];
        sid.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn filter_routes_voice_through_state_variable_core() {
        let mut sid = triangle_sid();
        sid.write(0xD415, 0x07); // cutoff low
        sid.write(0xD416, 0xFF); // cutoff high -> wide open
        sid.write(0xD417, 0x01); // route voice 1
        sid.write(0xD418, 0x1F); // low-pass + volume
        let mut buf = [0i16; 1024];
        sid.render(&mut buf);
        assert!(buf.iter().any(|&s| s != 0), "low-pass output should pass audio");
    }

    #[test]
    fn snapshot_round_trip_preserves_filter_state() {
        let mut sid = triangle_sid();
        let mut buf = [0i16; 333];
        sid.render(&mut buf);
        let snap = sid.snapshot();

        let mut a = [0i16; 128];
        sid.render(&mut a);

        let mut restored = Sid::new();
        restored.restore(&snap);
        let mut b = [0i16; 128];
        restored.render(&mut b);
        assert_eq!(a, b);
    }
}
