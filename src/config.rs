use std::time::Duration;

pub const NUM_REGISTERS: usize = 9;
pub const REGISTER_NAMES: [&str; NUM_REGISTERS] = ["t0", "ra", "sp", "s0", "s1", "t1", "a0", "a1", "PC"];
pub const INITIAL_REGISTER_VALUE: &str = "0x0000";

pub const REGISTER_SECTION_START: &str = "--- Final Register State ---";
pub const REGISTER_SECTION_END: &str = "---------------------------";

pub const DEFAULT_ASSEMBLER: &str = "z16asm";
pub const DEFAULT_SIMULATOR: &str = "z16sim";
pub const SOURCE_FILE_NAME: &str = "temp.asm";
pub const BINARY_FILE_NAME: &str = "temp.bin";

pub const READ_CHUNK_SIZE: usize = 4096;
pub const UI_TICK: Duration = Duration::from_millis(50);
