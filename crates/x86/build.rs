// Build script: generates the guest register table from guest-regs.def.
//
// Each line of the def file names one CPU-state slot and its width in bits.
// Offsets are assigned in order with natural alignment (capped at 16
// bytes); indices by position. The output is a set of `GuestReg` constants
// plus the full table, included by src/state.rs.

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

fn main() {
    let def_path = "guest-regs.def";
    println!("cargo:rerun-if-changed={def_path}");
    let def = fs::read_to_string(def_path).expect("reading guest-regs.def");

    let mut out = String::new();
    out.push_str("// Generated by build.rs from guest-regs.def. Do not edit.\n\n");

    let mut offset: u32 = 0;
    let mut index: u16 = 0;
    let mut names = Vec::new();

    for line in def.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let name = fields.next().expect("register name");
        let width: u32 = fields
            .next()
            .and_then(|w| w.parse().ok())
            .unwrap_or_else(|| panic!("bad width for register {name}"));
        assert!(fields.next().is_none(), "trailing fields for {name}");

        let bytes = width / 8;
        let align = bytes.min(16).max(1);
        offset = (offset + align - 1) & !(align - 1);

        let upper = name.to_uppercase();
        writeln!(
            out,
            "pub const {upper}: GuestReg = GuestReg {{ name: \"{name}\", \
             offset: {offset}, index: {index}, width: {width} }};"
        )
        .unwrap();

        names.push(upper);
        offset += bytes;
        index += 1;
    }

    out.push_str("\n/// Every guest register slot, in index order.\n");
    out.push_str("pub const ALL: &[GuestReg] = &[\n");
    for name in &names {
        writeln!(out, "    {name},").unwrap();
    }
    out.push_str("];\n");

    let out_path = PathBuf::from(env::var("OUT_DIR").unwrap()).join("guest_regs.rs");
    fs::write(out_path, out).expect("writing guest_regs.rs");
}
