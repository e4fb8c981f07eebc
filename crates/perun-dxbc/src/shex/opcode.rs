//! The SM4/SM5 opcode table.
//!
//! Numeric values follow the D3D10/D3D11 tokenized program format: the low 11
//! bits of every opcode token hold one of these values.

/// Numeric interpretation of a typeless 32-bit register lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NumberType {
    Float,
    Int,
    Uint,
    Double,
}

macro_rules! opcode_types {
    ($($name:ident = $value:literal => $mnemonic:literal,)*) => {
        /// Opcode type stored in bits 0..11 of an opcode token.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        pub enum OpcodeType {
            $($name = $value,)*
        }

        impl OpcodeType {
            /// Look up an opcode by its raw value.
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    $($value => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Assembly mnemonic as printed by the D3D disassembler.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcode_types! {
    Add = 0 => "add",
    And = 1 => "and",
    Break = 2 => "break",
    Breakc = 3 => "breakc",
    Call = 4 => "call",
    Callc = 5 => "callc",
    Case = 6 => "case",
    Continue = 7 => "continue",
    Continuec = 8 => "continuec",
    Cut = 9 => "cut",
    Default = 10 => "default",
    DerivRtx = 11 => "deriv_rtx",
    DerivRty = 12 => "deriv_rty",
    Discard = 13 => "discard",
    Div = 14 => "div",
    Dp2 = 15 => "dp2",
    Dp3 = 16 => "dp3",
    Dp4 = 17 => "dp4",
    Else = 18 => "else",
    Emit = 19 => "emit",
    EmitThenCut = 20 => "emitthencut",
    EndIf = 21 => "endif",
    EndLoop = 22 => "endloop",
    EndSwitch = 23 => "endswitch",
    Eq = 24 => "eq",
    Exp = 25 => "exp",
    Frc = 26 => "frc",
    Ftoi = 27 => "ftoi",
    Ftou = 28 => "ftou",
    Ge = 29 => "ge",
    Iadd = 30 => "iadd",
    If = 31 => "if",
    Ieq = 32 => "ieq",
    Ige = 33 => "ige",
    Ilt = 34 => "ilt",
    Imad = 35 => "imad",
    Imax = 36 => "imax",
    Imin = 37 => "imin",
    Imul = 38 => "imul",
    Ine = 39 => "ine",
    Ineg = 40 => "ineg",
    Ishl = 41 => "ishl",
    Ishr = 42 => "ishr",
    Itof = 43 => "itof",
    Label = 44 => "label",
    Ld = 45 => "ld",
    LdMs = 46 => "ld_ms",
    Log = 47 => "log",
    Loop = 48 => "loop",
    Lt = 49 => "lt",
    Mad = 50 => "mad",
    Min = 51 => "min",
    Max = 52 => "max",
    CustomData = 53 => "customdata",
    Mov = 54 => "mov",
    Movc = 55 => "movc",
    Mul = 56 => "mul",
    Ne = 57 => "ne",
    Nop = 58 => "nop",
    Not = 59 => "not",
    Or = 60 => "or",
    Resinfo = 61 => "resinfo",
    Ret = 62 => "ret",
    Retc = 63 => "retc",
    RoundNe = 64 => "round_ne",
    RoundNi = 65 => "round_ni",
    RoundPi = 66 => "round_pi",
    RoundZ = 67 => "round_z",
    Rsq = 68 => "rsq",
    Sample = 69 => "sample",
    SampleC = 70 => "sample_c",
    SampleCLz = 71 => "sample_c_lz",
    SampleL = 72 => "sample_l",
    SampleD = 73 => "sample_d",
    SampleB = 74 => "sample_b",
    Sqrt = 75 => "sqrt",
    Switch = 76 => "switch",
    Sincos = 77 => "sincos",
    Udiv = 78 => "udiv",
    Ult = 79 => "ult",
    Uge = 80 => "uge",
    Umul = 81 => "umul",
    Umad = 82 => "umad",
    Umax = 83 => "umax",
    Umin = 84 => "umin",
    Ushr = 85 => "ushr",
    Utof = 86 => "utof",
    Xor = 87 => "xor",
    DclResource = 88 => "dcl_resource",
    DclConstantBuffer = 89 => "dcl_constantbuffer",
    DclSampler = 90 => "dcl_sampler",
    DclIndexRange = 91 => "dcl_indexrange",
    DclGsOutputPrimitiveTopology = 92 => "dcl_outputtopology",
    DclGsInputPrimitive = 93 => "dcl_inputprimitive",
    DclMaxOutputVertexCount = 94 => "dcl_maxout",
    DclInput = 95 => "dcl_input",
    DclInputSgv = 96 => "dcl_input_sgv",
    DclInputSiv = 97 => "dcl_input_siv",
    DclInputPs = 98 => "dcl_input_ps",
    DclInputPsSgv = 99 => "dcl_input_ps_sgv",
    DclInputPsSiv = 100 => "dcl_input_ps_siv",
    DclOutput = 101 => "dcl_output",
    DclOutputSgv = 102 => "dcl_output_sgv",
    DclOutputSiv = 103 => "dcl_output_siv",
    DclTemps = 104 => "dcl_temps",
    DclIndexableTemp = 105 => "dcl_indexableTemp",
    DclGlobalFlags = 106 => "dcl_globalFlags",
    Lod = 108 => "lod",
    Gather4 = 109 => "gather4",
    SamplePos = 110 => "samplepos",
    SampleInfo = 111 => "sample_info",
    HsDecls = 113 => "hs_decls",
    HsControlPointPhase = 114 => "hs_control_point_phase",
    HsForkPhase = 115 => "hs_fork_phase",
    HsJoinPhase = 116 => "hs_join_phase",
    EmitStream = 117 => "emit_stream",
    CutStream = 118 => "cut_stream",
    EmitThenCutStream = 119 => "emitthencut_stream",
    InterfaceCall = 120 => "fcall",
    Bufinfo = 121 => "bufinfo",
    DerivRtxCoarse = 122 => "deriv_rtx_coarse",
    DerivRtxFine = 123 => "deriv_rtx_fine",
    DerivRtyCoarse = 124 => "deriv_rty_coarse",
    DerivRtyFine = 125 => "deriv_rty_fine",
    Gather4C = 126 => "gather4_c",
    Gather4Po = 127 => "gather4_po",
    Gather4PoC = 128 => "gather4_po_c",
    Rcp = 129 => "rcp",
    F32tof16 = 130 => "f32tof16",
    F16tof32 = 131 => "f16tof32",
    Uaddc = 132 => "uaddc",
    Usubb = 133 => "usubb",
    Countbits = 134 => "countbits",
    FirstbitHi = 135 => "firstbit_hi",
    FirstbitLo = 136 => "firstbit_lo",
    FirstbitShi = 137 => "firstbit_shi",
    Ubfe = 138 => "ubfe",
    Ibfe = 139 => "ibfe",
    Bfi = 140 => "bfi",
    Bfrev = 141 => "bfrev",
    Swapc = 142 => "swapc",
    DclStream = 143 => "dcl_stream",
    DclFunctionBody = 144 => "dcl_function_body",
    DclFunctionTable = 145 => "dcl_function_table",
    DclInterface = 146 => "dcl_interface",
    DclInputControlPointCount = 147 => "dcl_input_control_point_count",
    DclOutputControlPointCount = 148 => "dcl_output_control_point_count",
    DclTessDomain = 149 => "dcl_tessellator_domain",
    DclTessPartitioning = 150 => "dcl_tessellator_partitioning",
    DclTessOutputPrimitive = 151 => "dcl_tessellator_output_primitive",
    DclHsMaxTessFactor = 152 => "dcl_hs_max_tessfactor",
    DclHsForkPhaseInstanceCount = 153 => "dcl_hs_fork_phase_instance_count",
    DclHsJoinPhaseInstanceCount = 154 => "dcl_hs_join_phase_instance_count",
    DclThreadGroup = 155 => "dcl_thread_group",
    DclUavTyped = 156 => "dcl_uav_typed",
    DclUavRaw = 157 => "dcl_uav_raw",
    DclUavStructured = 158 => "dcl_uav_structured",
    DclTgsmRaw = 159 => "dcl_tgsm_raw",
    DclTgsmStructured = 160 => "dcl_tgsm_structured",
    DclResourceRaw = 161 => "dcl_resource_raw",
    DclResourceStructured = 162 => "dcl_resource_structured",
    LdUavTyped = 163 => "ld_uav_typed",
    StoreUavTyped = 164 => "store_uav_typed",
    LdRaw = 165 => "ld_raw",
    StoreRaw = 166 => "store_raw",
    LdStructured = 167 => "ld_structured",
    StoreStructured = 168 => "store_structured",
    AtomicAnd = 169 => "atomic_and",
    AtomicOr = 170 => "atomic_or",
    AtomicXor = 171 => "atomic_xor",
    AtomicCmpStore = 172 => "atomic_cmp_store",
    AtomicIadd = 173 => "atomic_iadd",
    AtomicImax = 174 => "atomic_imax",
    AtomicImin = 175 => "atomic_imin",
    AtomicUmax = 176 => "atomic_umax",
    AtomicUmin = 177 => "atomic_umin",
    ImmAtomicAlloc = 178 => "imm_atomic_alloc",
    ImmAtomicConsume = 179 => "imm_atomic_consume",
    ImmAtomicIadd = 180 => "imm_atomic_iadd",
    ImmAtomicAnd = 181 => "imm_atomic_and",
    ImmAtomicOr = 182 => "imm_atomic_or",
    ImmAtomicXor = 183 => "imm_atomic_xor",
    ImmAtomicExch = 184 => "imm_atomic_exch",
    ImmAtomicCmpExch = 185 => "imm_atomic_cmp_exch",
    ImmAtomicImax = 186 => "imm_atomic_imax",
    ImmAtomicImin = 187 => "imm_atomic_imin",
    ImmAtomicUmax = 188 => "imm_atomic_umax",
    ImmAtomicUmin = 189 => "imm_atomic_umin",
    Sync = 190 => "sync",
    Dadd = 191 => "dadd",
    Dmax = 192 => "dmax",
    Dmin = 193 => "dmin",
    Dmul = 194 => "dmul",
    Deq = 195 => "deq",
    Dge = 196 => "dge",
    Dlt = 197 => "dlt",
    Dne = 198 => "dne",
    Dmov = 199 => "dmov",
    Dmovc = 200 => "dmovc",
    Dtof = 201 => "dtof",
    Ftod = 202 => "ftod",
    EvalSnapped = 203 => "eval_snapped",
    EvalSampleIndex = 204 => "eval_sample_index",
    EvalCentroid = 205 => "eval_centroid",
    DclGsInstanceCount = 206 => "dcl_gs_instance_count",
    Abort = 207 => "abort",
    DebugBreak = 208 => "debug_break",
    Ddiv = 210 => "ddiv",
    Dfma = 211 => "dfma",
    Drcp = 212 => "drcp",
    Msad = 213 => "msad",
    Dtoi = 214 => "dtoi",
    Dtou = 215 => "dtou",
    Itod = 216 => "itod",
    Utod = 217 => "utod",
}

impl OpcodeType {
    /// Whether the opcode is a `dcl_*` declaration with its own token layout.
    pub fn is_declaration(self) -> bool {
        let raw = self as u32;
        (88..=106).contains(&raw) || (143..=162).contains(&raw) || self == Self::DclGsInstanceCount
    }

    /// Number types of the (destination, source) operands.
    ///
    /// DXBC registers are typeless; the opcode decides how the bits are read
    /// and how the result is written.
    pub fn number_types(self) -> (NumberType, NumberType) {
        use NumberType::*;
        use OpcodeType::*;

        match self {
            Iadd | Imad | Imax | Imin | Imul | Ineg | Ishl | Ishr | Ibfe | AtomicIadd
            | AtomicImax | AtomicImin | ImmAtomicIadd | ImmAtomicImax | ImmAtomicImin => {
                (Int, Int)
            }
            And | Or | Xor | Not | Ushr | Umul | Umad | Umax | Umin | Udiv | Ubfe | Bfi
            | Bfrev | Countbits | FirstbitHi | FirstbitLo | Uaddc | Usubb | AtomicAnd
            | AtomicOr | AtomicXor | AtomicUmax | AtomicUmin | ImmAtomicAnd | ImmAtomicOr
            | ImmAtomicXor | ImmAtomicExch | ImmAtomicUmax | ImmAtomicUmin => (Uint, Uint),
            FirstbitShi => (Uint, Int),
            Eq | Ne | Lt | Ge => (Uint, Float),
            Ieq | Ine | Ilt | Ige => (Uint, Int),
            Ult | Uge => (Uint, Uint),
            Ftoi => (Int, Float),
            Ftou => (Uint, Float),
            Itof => (Float, Int),
            Utof => (Float, Uint),
            Dadd | Dmax | Dmin | Dmul | Dmov | Dmovc | Ddiv | Dfma | Drcp => (Double, Double),
            Deq | Dge | Dlt | Dne => (Uint, Double),
            Dtof => (Float, Double),
            Ftod => (Double, Float),
            Dtoi => (Int, Double),
            Dtou => (Uint, Double),
            Itod => (Double, Int),
            Utod => (Double, Uint),
            _ => (Float, Float),
        }
    }

    /// GLSL infix operator for opcodes that map onto one.
    pub fn infix_operator(self) -> Option<&'static str> {
        use OpcodeType::*;

        match self {
            Add | Iadd | Dadd => Some("+"),
            Mul | Dmul => Some("*"),
            Div | Ddiv => Some("/"),
            And => Some("&"),
            Or => Some("|"),
            Xor => Some("^"),
            Ishl => Some("<<"),
            Ishr | Ushr => Some(">>"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(OpcodeType::from_raw(54), Some(OpcodeType::Mov));
        assert_eq!(OpcodeType::from_raw(104), Some(OpcodeType::DclTemps));
        assert_eq!(OpcodeType::from_raw(107), None);
        assert_eq!(OpcodeType::from_raw(0x7ff), None);
        assert_eq!(OpcodeType::Udiv.mnemonic(), "udiv");
    }

    #[test]
    fn test_declaration_ranges() {
        assert!(OpcodeType::DclResource.is_declaration());
        assert!(OpcodeType::DclGlobalFlags.is_declaration());
        assert!(OpcodeType::DclResourceStructured.is_declaration());
        assert!(OpcodeType::DclGsInstanceCount.is_declaration());
        assert!(!OpcodeType::Mov.is_declaration());
        assert!(!OpcodeType::CustomData.is_declaration());
        assert!(!OpcodeType::LdUavTyped.is_declaration());
    }

    #[test]
    fn test_number_types() {
        assert_eq!(
            OpcodeType::Mad.number_types(),
            (NumberType::Float, NumberType::Float)
        );
        assert_eq!(
            OpcodeType::Ftoi.number_types(),
            (NumberType::Int, NumberType::Float)
        );
        assert_eq!(
            OpcodeType::Ult.number_types(),
            (NumberType::Uint, NumberType::Uint)
        );
        assert_eq!(
            OpcodeType::Iadd.number_types(),
            (NumberType::Int, NumberType::Int)
        );
    }
}
