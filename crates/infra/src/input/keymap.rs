//! Key numbering
//!
//! Key codes use the libuiohook scan-code numbering (Escape = 1, A = 30, ...)
//! so configs stay readable across platforms.

use rdev::Key;
use soundboard_core::domain::hotkey::KeyCode;

const KEYS: &[(Key, u16, &str)] = &[
    (Key::Escape, 0x0001, "Esc"),
    (Key::Num1, 0x0002, "1"),
    (Key::Num2, 0x0003, "2"),
    (Key::Num3, 0x0004, "3"),
    (Key::Num4, 0x0005, "4"),
    (Key::Num5, 0x0006, "5"),
    (Key::Num6, 0x0007, "6"),
    (Key::Num7, 0x0008, "7"),
    (Key::Num8, 0x0009, "8"),
    (Key::Num9, 0x000A, "9"),
    (Key::Num0, 0x000B, "0"),
    (Key::Minus, 0x000C, "-"),
    (Key::Equal, 0x000D, "="),
    (Key::Backspace, 0x000E, "Backspace"),
    (Key::Tab, 0x000F, "Tab"),
    (Key::KeyQ, 0x0010, "Q"),
    (Key::KeyW, 0x0011, "W"),
    (Key::KeyE, 0x0012, "E"),
    (Key::KeyR, 0x0013, "R"),
    (Key::KeyT, 0x0014, "T"),
    (Key::KeyY, 0x0015, "Y"),
    (Key::KeyU, 0x0016, "U"),
    (Key::KeyI, 0x0017, "I"),
    (Key::KeyO, 0x0018, "O"),
    (Key::KeyP, 0x0019, "P"),
    (Key::LeftBracket, 0x001A, "["),
    (Key::RightBracket, 0x001B, "]"),
    (Key::Return, 0x001C, "Enter"),
    (Key::ControlLeft, 0x001D, "Ctrl"),
    (Key::KeyA, 0x001E, "A"),
    (Key::KeyS, 0x001F, "S"),
    (Key::KeyD, 0x0020, "D"),
    (Key::KeyF, 0x0021, "F"),
    (Key::KeyG, 0x0022, "G"),
    (Key::KeyH, 0x0023, "H"),
    (Key::KeyJ, 0x0024, "J"),
    (Key::KeyK, 0x0025, "K"),
    (Key::KeyL, 0x0026, "L"),
    (Key::SemiColon, 0x0027, ";"),
    (Key::Quote, 0x0028, "'"),
    (Key::BackQuote, 0x0029, "`"),
    (Key::ShiftLeft, 0x002A, "Shift"),
    (Key::BackSlash, 0x002B, "\\"),
    (Key::KeyZ, 0x002C, "Z"),
    (Key::KeyX, 0x002D, "X"),
    (Key::KeyC, 0x002E, "C"),
    (Key::KeyV, 0x002F, "V"),
    (Key::KeyB, 0x0030, "B"),
    (Key::KeyN, 0x0031, "N"),
    (Key::KeyM, 0x0032, "M"),
    (Key::Comma, 0x0033, ","),
    (Key::Dot, 0x0034, "."),
    (Key::Slash, 0x0035, "/"),
    (Key::ShiftRight, 0x0036, "Right Shift"),
    (Key::KpMultiply, 0x0037, "Num *"),
    (Key::Alt, 0x0038, "Alt"),
    (Key::Space, 0x0039, "Space"),
    (Key::CapsLock, 0x003A, "Caps Lock"),
    (Key::F1, 0x003B, "F1"),
    (Key::F2, 0x003C, "F2"),
    (Key::F3, 0x003D, "F3"),
    (Key::F4, 0x003E, "F4"),
    (Key::F5, 0x003F, "F5"),
    (Key::F6, 0x0040, "F6"),
    (Key::F7, 0x0041, "F7"),
    (Key::F8, 0x0042, "F8"),
    (Key::F9, 0x0043, "F9"),
    (Key::F10, 0x0044, "F10"),
    (Key::NumLock, 0x0045, "Num Lock"),
    (Key::ScrollLock, 0x0046, "Scroll Lock"),
    (Key::Kp7, 0x0047, "Num 7"),
    (Key::Kp8, 0x0048, "Num 8"),
    (Key::Kp9, 0x0049, "Num 9"),
    (Key::KpMinus, 0x004A, "Num -"),
    (Key::Kp4, 0x004B, "Num 4"),
    (Key::Kp5, 0x004C, "Num 5"),
    (Key::Kp6, 0x004D, "Num 6"),
    (Key::KpPlus, 0x004E, "Num +"),
    (Key::Kp1, 0x004F, "Num 1"),
    (Key::Kp2, 0x0050, "Num 2"),
    (Key::Kp3, 0x0051, "Num 3"),
    (Key::Kp0, 0x0052, "Num 0"),
    (Key::KpDelete, 0x0053, "Num ."),
    (Key::IntlBackslash, 0x0056, "<"),
    (Key::F11, 0x0057, "F11"),
    (Key::F12, 0x0058, "F12"),
    (Key::KpReturn, 0x0E1C, "Num Enter"),
    (Key::ControlRight, 0x0E1D, "Right Ctrl"),
    (Key::KpDivide, 0x0E35, "Num /"),
    (Key::PrintScreen, 0x0E37, "Print Screen"),
    (Key::AltGr, 0x0E38, "Right Alt"),
    (Key::Pause, 0x0E45, "Pause"),
    (Key::Home, 0x0E47, "Home"),
    (Key::PageUp, 0x0E49, "Page Up"),
    (Key::End, 0x0E4F, "End"),
    (Key::PageDown, 0x0E51, "Page Down"),
    (Key::Insert, 0x0E52, "Insert"),
    (Key::Delete, 0x0E53, "Delete"),
    (Key::MetaLeft, 0x0E5B, "Meta"),
    (Key::MetaRight, 0x0E5C, "Right Meta"),
    (Key::UpArrow, 0xE048, "Up"),
    (Key::LeftArrow, 0xE04B, "Left"),
    (Key::RightArrow, 0xE04D, "Right"),
    (Key::DownArrow, 0xE050, "Down"),
];

/// Key code for an rdev key. Keys rdev could not identify keep their raw
/// platform code.
pub fn key_code(key: Key) -> Option<KeyCode> {
    if let Key::Unknown(raw) = key {
        return u16::try_from(raw).ok().map(KeyCode::new);
    }
    KEYS.iter()
        .find(|(k, _, _)| *k == key)
        .map(|(_, code, _)| KeyCode::new(*code))
}

/// Display label for a key code; unknown codes show as `Key <n>`
pub fn key_name(code: KeyCode) -> String {
    KEYS.iter()
        .find(|(_, c, _)| *c == code.value())
        .map(|(_, _, name)| name.to_string())
        .unwrap_or_else(|| format!("Key {}", code.value()))
}

/// Label for an optional binding
pub fn binding_name(code: Option<KeyCode>) -> String {
    code.map(key_name).unwrap_or_else(|| "unset".to_string())
}
