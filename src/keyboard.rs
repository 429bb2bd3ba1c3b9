/*!
Host-side input naming for the keyboard matrix and joystick 2.

The host delivers `(Key, pressed)` events; `Key::matrix` maps each key to its
fixed `(row, column)` coordinate in the 8×8 matrix that CIA1 scans (column
select on port A, active low, rows read back). The table below is the stock
C64 matrix layout, which is what the KERNAL's scan-code tables expect.

Joystick 2 shares CIA1 port A: bits 0..3 are up/down/left/right and bit 4 is
fire, all active low.
*/

/// Every key on the 64-key matrix, named after its keycap.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Key {
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,
    F1, F3, F5, F7,
    Return, Space, InstDel, ClrHome, RunStop,
    CursorDown, CursorRight,
    LShift, RShift, Control, Commodore,
    Plus, Minus, Pound, At, Asterisk, Caret,
    Colon, Semicolon, Equals, Comma, Period, Slash, ArrowLeft,
}

impl Key {
    /// Matrix coordinate `(row, column)` of this key.
    pub fn matrix(self) -> (u8, u8) {
        use Key::*;
        match self {
            InstDel => (0, 0),
            Return => (0, 1),
            CursorRight => (0, 2),
            F7 => (0, 3),
            F1 => (0, 4),
            F3 => (0, 5),
            F5 => (0, 6),
            CursorDown => (0, 7),

            Digit3 => (1, 0),
            W => (1, 1),
            A => (1, 2),
            Digit4 => (1, 3),
            Z => (1, 4),
            S => (1, 5),
            E => (1, 6),
            LShift => (1, 7),

            Digit5 => (2, 0),
            R => (2, 1),
            D => (2, 2),
            Digit6 => (2, 3),
            C => (2, 4),
            F => (2, 5),
            T => (2, 6),
            X => (2, 7),

            Digit7 => (3, 0),
            Y => (3, 1),
            G => (3, 2),
            Digit8 => (3, 3),
            B => (3, 4),
            H => (3, 5),
            U => (3, 6),
            V => (3, 7),

            Digit9 => (4, 0),
            I => (4, 1),
            J => (4, 2),
            Digit0 => (4, 3),
            M => (4, 4),
            K => (4, 5),
            O => (4, 6),
            N => (4, 7),

            Plus => (5, 0),
            P => (5, 1),
            L => (5, 2),
            Minus => (5, 3),
            Period => (5, 4),
            Colon => (5, 5),
            At => (5, 6),
            Comma => (5, 7),

            Pound => (6, 0),
            Asterisk => (6, 1),
            Semicolon => (6, 2),
            ClrHome => (6, 3),
            RShift => (6, 4),
            Equals => (6, 5),
            Caret => (6, 6),
            Slash => (6, 7),

            Digit1 => (7, 0),
            ArrowLeft => (7, 1),
            Control => (7, 2),
            Digit2 => (7, 3),
            Space => (7, 4),
            Commodore => (7, 5),
            Q => (7, 6),
            RunStop => (7, 7),
        }
    }
}

/// Joystick 2 inputs, one per CIA1 port A bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoyInput {
    Up,
    Down,
    Left,
    Right,
    Fire,
}

impl JoyInput {
    /// Port A bit position (active low on the wire).
    pub fn bit(self) -> u8 {
        match self {
            JoyInput::Up => 0,
            JoyInput::Down => 1,
            JoyInput::Left => 2,
            JoyInput::Right => 3,
            JoyInput::Fire => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_positions_are_unique() {
        use std::collections::HashSet;
        let keys = [
            Key::A, Key::B, Key::C, Key::D, Key::E, Key::F, Key::G, Key::H,
            Key::I, Key::J, Key::K, Key::L, Key::M, Key::N, Key::O, Key::P,
            Key::Q, Key::R, Key::S, Key::T, Key::U, Key::V, Key::W, Key::X,
            Key::Y, Key::Z, Key::Digit0, Key::Digit1, Key::Digit2, Key::Digit3,
            Key::Digit4, Key::Digit5, Key::Digit6, Key::Digit7, Key::Digit8,
            Key::Digit9, Key::F1, Key::F3, Key::F5, Key::F7, Key::Return,
            Key::Space, Key::InstDel, Key::ClrHome, Key::RunStop,
            Key::CursorDown, Key::CursorRight, Key::LShift, Key::RShift,
            Key::Control, Key::Commodore, Key::Plus, Key::Minus, Key::Pound,
            Key::At, Key::Asterisk, Key::Caret, Key::Colon, Key::Semicolon,
            Key::Equals, Key::Comma, Key::Period, Key::Slash, Key::ArrowLeft,
        ];
        let mut seen = HashSet::new();
        for k in keys {
            let (r, c) = k.matrix();
            assert!(r < 8 && c < 8, "{k:?} out of matrix bounds");
            assert!(seen.insert((r, c)), "{k:?} collides at ({r},{c})");
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn letter_a_sits_on_the_stock_matrix_slot() {
        assert_eq!(Key::A.matrix(), (1, 2));
        assert_eq!(Key::Space.matrix(), (7, 4));
        assert_eq!(Key::Return.matrix(), (0, 1));
    }

    #[test]
    fn joystick_bits() {
        assert_eq!(JoyInput::Up.bit(), 0);
        assert_eq!(JoyInput::Fire.bit(), 4);
    }
}
