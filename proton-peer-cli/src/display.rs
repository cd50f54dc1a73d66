// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Display Helpers

use console::style;

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

pub fn error(message: &str) {
    eprintln!("{} {}", style("✗").red().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", style("→").cyan(), message);
}

/// Renders parameters as text when they are printable UTF-8, hex otherwise.
pub fn bytes(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) if !text.chars().any(|c| c.is_control() && c != '\n') => text.to_string(),
        _ => format!("0x{}", hex::encode(data)),
    }
}
