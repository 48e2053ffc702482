use crate::jvm::verifier::VerificationType;

/// Opcodes of the instructions the builders emit
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5
pub mod opcode {
    pub const ICONST_M1: u8 = 0x02;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC_W: u8 = 0x13;

    pub const ILOAD: u8 = 0x15;
    pub const LLOAD: u8 = 0x16;
    pub const FLOAD: u8 = 0x17;
    pub const DLOAD: u8 = 0x18;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const LLOAD_0: u8 = 0x1e;
    pub const FLOAD_0: u8 = 0x22;
    pub const DLOAD_0: u8 = 0x26;
    pub const ALOAD_0: u8 = 0x2a;

    pub const ISTORE: u8 = 0x36;
    pub const LSTORE: u8 = 0x37;
    pub const FSTORE: u8 = 0x38;
    pub const DSTORE: u8 = 0x39;
    pub const ASTORE: u8 = 0x3a;
    pub const ISTORE_0: u8 = 0x3b;
    pub const LSTORE_0: u8 = 0x3f;
    pub const FSTORE_0: u8 = 0x43;
    pub const DSTORE_0: u8 = 0x47;
    pub const ASTORE_0: u8 = 0x4b;

    pub const POP: u8 = 0x57;
    pub const POP2: u8 = 0x58;
    pub const DUP: u8 = 0x59;
    pub const DUP2: u8 = 0x5c;

    pub const IADD: u8 = 0x60;
    pub const ISUB: u8 = 0x64;
    pub const IMUL: u8 = 0x68;
    pub const IDIV: u8 = 0x6c;
    pub const IREM: u8 = 0x70;
    pub const INEG: u8 = 0x74;
    pub const ISHL: u8 = 0x78;
    pub const ISHR: u8 = 0x7a;
    pub const IUSHR: u8 = 0x7c;
    pub const IAND: u8 = 0x7e;
    pub const IOR: u8 = 0x80;
    pub const IXOR: u8 = 0x82;

    pub const IF_ICMPEQ: u8 = 0x9f;
    pub const IF_ICMPNE: u8 = 0xa0;
    pub const IF_ICMPLT: u8 = 0xa1;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const IF_ICMPGT: u8 = 0xa3;
    pub const IF_ICMPLE: u8 = 0xa4;
    pub const GOTO: u8 = 0xa7;

    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;

    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKESTATIC: u8 = 0xb8;

    pub const WIDE: u8 = 0xc4;

    /// Value types: push the all-zero instance of a value class
    pub const DEFAULTVALUE: u8 = 0xcb;

    /// Value types: copy an instance with one field replaced
    pub const WITHFIELD: u8 = 0xcc;
}

/// Primitive kinds that arithmetic instructions come in
///
/// Typed instruction families are laid out in this order (eg. `iadd`, `ladd`, `fadd`, `dadd`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
}

impl NumericKind {
    pub fn verification_type(self) -> VerificationType {
        match self {
            NumericKind::Int => VerificationType::Integer,
            NumericKind::Long => VerificationType::Long,
            NumericKind::Float => VerificationType::Float,
            NumericKind::Double => VerificationType::Double,
        }
    }

    /// Distance from the `int` variant of an instruction family
    fn opcode_offset(self) -> u8 {
        match self {
            NumericKind::Int => 0,
            NumericKind::Long => 1,
            NumericKind::Float => 2,
            NumericKind::Double => 3,
        }
    }

    fn mnemonic_prefix(self) -> char {
        match self {
            NumericKind::Int => 'i',
            NumericKind::Long => 'l',
            NumericKind::Float => 'f',
            NumericKind::Double => 'd',
        }
    }

    fn is_integral(self) -> bool {
        matches!(self, NumericKind::Int | NumericKind::Long)
    }
}

/// Binary arithmetic and logical operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

impl ArithmeticOp {
    /// Shifts take an `int` shift distance, even for `long` values
    pub fn is_shift(self) -> bool {
        matches!(self, ArithmeticOp::Shl | ArithmeticOp::Shr | ArithmeticOp::UShr)
    }

    /// Opcode for this operation on the given kind, if the JVM has one
    pub fn opcode(self, kind: NumericKind) -> Option<u8> {
        let int_opcode = match self {
            ArithmeticOp::Add => opcode::IADD,
            ArithmeticOp::Sub => opcode::ISUB,
            ArithmeticOp::Mul => opcode::IMUL,
            ArithmeticOp::Div => opcode::IDIV,
            ArithmeticOp::Rem => opcode::IREM,
            ArithmeticOp::Shl => opcode::ISHL,
            ArithmeticOp::Shr => opcode::ISHR,
            ArithmeticOp::UShr => opcode::IUSHR,
            ArithmeticOp::And => opcode::IAND,
            ArithmeticOp::Or => opcode::IOR,
            ArithmeticOp::Xor => opcode::IXOR,
        };
        let bitwise = self.is_shift()
            || matches!(self, ArithmeticOp::And | ArithmeticOp::Or | ArithmeticOp::Xor);
        if bitwise && !kind.is_integral() {
            None
        } else {
            Some(int_opcode + kind.opcode_offset())
        }
    }

    pub fn mnemonic(self, kind: NumericKind) -> String {
        let name = match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Sub => "sub",
            ArithmeticOp::Mul => "mul",
            ArithmeticOp::Div => "div",
            ArithmeticOp::Rem => "rem",
            ArithmeticOp::Shl => "shl",
            ArithmeticOp::Shr => "shr",
            ArithmeticOp::UShr => "ushr",
            ArithmeticOp::And => "and",
            ArithmeticOp::Or => "or",
            ArithmeticOp::Xor => "xor",
        };
        format!("{}{}", kind.mnemonic_prefix(), name)
    }
}

/// `ineg`, `lneg`, `fneg`, `dneg`
pub fn negate_opcode(kind: NumericKind) -> u8 {
    opcode::INEG + kind.opcode_offset()
}

pub fn negate_mnemonic(kind: NumericKind) -> String {
    format!("{}neg", kind.mnemonic_prefix())
}

/// Signed comparison of the two `int`s on top of the stack
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchCondition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl BranchCondition {
    /// Opcode of the comparison that jumps when this condition is false
    ///
    /// The builder lays out the "true" successor as the fallthrough, so the emitted comparison is
    /// the negated one, targeting the "false" successor. Only `Le` has an encoding so far.
    pub fn negated_compare_opcode(self) -> Option<u8> {
        match self {
            BranchCondition::Le => Some(opcode::IF_ICMPGT),
            BranchCondition::Eq
            | BranchCondition::Ne
            | BranchCondition::Lt
            | BranchCondition::Ge
            | BranchCondition::Gt => None,
        }
    }

    pub fn negated_compare_mnemonic(self) -> &'static str {
        match self {
            BranchCondition::Eq => "if_icmpne",
            BranchCondition::Ne => "if_icmpeq",
            BranchCondition::Lt => "if_icmpge",
            BranchCondition::Ge => "if_icmplt",
            BranchCondition::Gt => "if_icmple",
            BranchCondition::Le => "if_icmpgt",
        }
    }
}

/// Typed load and store instruction families
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct LocalAccess {
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub short_opcode: u8,
}

impl LocalAccess {
    /// Family used to load a local of this type, if it can be loaded at all
    pub fn load(vtype: VerificationType) -> Option<LocalAccess> {
        let (mnemonic, opcode, short_opcode) = match vtype {
            VerificationType::Integer => ("iload", opcode::ILOAD, opcode::ILOAD_0),
            VerificationType::Long => ("lload", opcode::LLOAD, opcode::LLOAD_0),
            VerificationType::Float => ("fload", opcode::FLOAD, opcode::FLOAD_0),
            VerificationType::Double => ("dload", opcode::DLOAD, opcode::DLOAD_0),
            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => ("aload", opcode::ALOAD, opcode::ALOAD_0),
            VerificationType::Top => return None,
        };
        Some(LocalAccess {
            mnemonic,
            opcode,
            short_opcode,
        })
    }

    /// Family used to store into a local of this type, if it can be stored at all
    pub fn store(vtype: VerificationType) -> Option<LocalAccess> {
        let (mnemonic, opcode, short_opcode) = match vtype {
            VerificationType::Integer => ("istore", opcode::ISTORE, opcode::ISTORE_0),
            VerificationType::Long => ("lstore", opcode::LSTORE, opcode::LSTORE_0),
            VerificationType::Float => ("fstore", opcode::FSTORE, opcode::FSTORE_0),
            VerificationType::Double => ("dstore", opcode::DSTORE, opcode::DSTORE_0),
            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => ("astore", opcode::ASTORE, opcode::ASTORE_0),
            VerificationType::Top => return None,
        };
        Some(LocalAccess {
            mnemonic,
            opcode,
            short_opcode,
        })
    }

    /// Encode an access to `slot`: `xload_<n>` for 0-3, `xload n` up to 255, `wide xload n` past
    /// that
    pub fn encode(&self, slot: u16, code: &mut Vec<u8>) {
        match slot {
            0..=3 => code.push(self.short_opcode + slot as u8),
            4..=255 => code.extend_from_slice(&[self.opcode, slot as u8]),
            _ => {
                code.extend_from_slice(&[opcode::WIDE, self.opcode]);
                code.extend_from_slice(&slot.to_be_bytes());
            }
        }
    }
}

/// Opcode returning a value of the given type
pub fn return_opcode(vtype: VerificationType) -> Option<u8> {
    match vtype {
        VerificationType::Integer => Some(opcode::IRETURN),
        VerificationType::Long => Some(opcode::LRETURN),
        VerificationType::Float => Some(opcode::FRETURN),
        VerificationType::Double => Some(opcode::DRETURN),
        VerificationType::Null | VerificationType::Object(_) => Some(opcode::ARETURN),
        VerificationType::Top
        | VerificationType::UninitializedThis
        | VerificationType::Uninitialized(_) => None,
    }
}
