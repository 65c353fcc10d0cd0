/// Instruction mnemonics understood by the Z16 assembler.
pub const MNEMONICS: [&str; 41] = [
    "add", "sub", "slt", "sltu", "sll", "srl", "sra", "or", "and", "xor", "mv", "jr", "jalr",
    "addi", "slti", "sltui", "slli", "srli", "srai", "ori", "andi", "xori", "li",
    "beq", "bne", "bz", "bnz", "blt", "bge", "bltu", "bgeu",
    "lb", "lw", "lbu", "sb", "sw",
    "j", "jal", "lui", "auipc", "ecall",
];

pub const DIRECTIVES: [&str; 7] = [".text", ".data", ".org", ".asciiz", ".byte", ".word", ".space"];

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LineKind {
    Blank,
    Label,
    Recognized,
    Invalid,
}

impl LineKind {
    pub fn is_valid(self) -> bool {
        self != LineKind::Invalid
    }
}

/// Classifies one comment-free, trimmed source line by its leading token.
///
/// Operands are never inspected; the assembler has the final word on them.
pub fn classify(line: &str) -> LineKind {
    let Some(first) = line.split_whitespace().next() else {
        return LineKind::Blank;
    };

    let token = first.to_lowercase();
    if token.ends_with(':') {
        return LineKind::Label;
    }

    if is_mnemonic(&token) || is_directive(&token) {
        LineKind::Recognized
    } else {
        LineKind::Invalid
    }
}

fn is_mnemonic(token: &str) -> bool {
    MNEMONICS.contains(&token)
}

fn is_directive(token: &str) -> bool {
    DIRECTIVES.contains(&token)
}
