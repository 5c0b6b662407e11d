// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builder for small WAT guest modules.
//!
//! Every generated module imports the full `waypoint` host ABI as `$log`,
//! `$set_output` and `$has_permission`, and exports one page of `memory`.
//! [`GuestModule::json_export`] adds an export that hands a fixed JSON
//! payload to `set_output`.

const DATA_START: u32 = 16;

/// A guest module under construction.
#[derive(Debug, Clone)]
pub struct GuestModule {
    data: Vec<(u32, String)>,
    funcs: Vec<String>,
    next_offset: u32,
    export_memory: bool,
}

impl GuestModule {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            funcs: Vec::new(),
            next_offset: DATA_START,
            export_memory: true,
        }
    }

    /// Stores `text` in linear memory and returns `(offset, byte_len)`.
    pub fn place(&mut self, text: &str) -> (u32, u32) {
        let offset = self.next_offset;
        let len = text.len() as u32;
        self.data.push((offset, text.to_string()));
        self.next_offset = (offset + len + 7) & !7;
        (offset, len)
    }

    /// Adds an export `name` that outputs `json` when called.
    pub fn json_export(&mut self, name: &str, json: &str) -> &mut Self {
        let (offset, len) = self.place(json);
        self.funcs.push(format!(
            r#"(func (export "{name}") (call $set_output (i32.const {offset}) (i32.const {len})))"#
        ));
        self
    }

    /// Adds a raw WAT function definition.
    pub fn func(&mut self, wat: &str) -> &mut Self {
        self.funcs.push(wat.to_string());
        self
    }

    /// Omits the `memory` export.
    pub fn without_memory(&mut self) -> &mut Self {
        self.export_memory = false;
        self
    }

    /// Renders the module as WAT text.
    pub fn wat(&self) -> String {
        let mut out = String::from("(module\n");
        out.push_str(
            "  (import \"waypoint\" \"log\" (func $log (param i32 i32 i32)))\n\
             \x20 (import \"waypoint\" \"set_output\" (func $set_output (param i32 i32)))\n\
             \x20 (import \"waypoint\" \"has_permission\" (func $has_permission (param i32 i32) (result i32)))\n",
        );
        if self.export_memory {
            out.push_str("  (memory (export \"memory\") 1)\n");
        } else {
            out.push_str("  (memory 1)\n");
        }
        for (offset, text) in &self.data {
            out.push_str(&format!(
                "  (data (i32.const {offset}) \"{}\")\n",
                escape(text)
            ));
        }
        for func in &self.funcs {
            out.push_str("  ");
            out.push_str(func);
            out.push('\n');
        }
        out.push(')');
        out
    }

    /// Assembles the module into WASM bytes.
    pub fn wasm(&self) -> Vec<u8> {
        wat::parse_str(self.wat()).expect("generated WAT should assemble")
    }
}

impl Default for GuestModule {
    fn default() -> Self {
        Self::new()
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_do_not_overlap() {
        let mut module = GuestModule::new();
        let (a, a_len) = module.place("abc");
        let (b, _) = module.place("defgh");
        assert_eq!(a, DATA_START);
        assert!(b >= a + a_len);
        assert_eq!(b % 8, 0);
    }

    #[test]
    fn json_is_escaped_and_assembles() {
        let wasm = GuestModule::new()
            .json_export("manifest", r#"{"id":"x","name":"a \"quoted\" name"}"#)
            .wasm();
        assert_eq!(&wasm[..4], b"\0asm");
    }

    #[test]
    fn memory_export_can_be_dropped() {
        let wat = GuestModule::new().without_memory().wat();
        assert!(!wat.contains("(export \"memory\")"));
    }
}
