//! Opcode numbering.
//!
//! The numeric values are a bit-exact contract with the virtual machine;
//! renumbering breaks every `.vmb` in the field. Opcodes are grouped by
//! function with gaps left for growth.

use std::convert::TryFrom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Stack
    /// Push constant-pool entry. `operands: [pool index]`
    PushConst = 0x01,
    /// Push immediate i32. `operands: [value as u32]`
    PushInt = 0x02,
    /// Push boolean. `operands: [0 or 1]`
    PushBool = 0x03,
    Dup = 0x04,
    Pop = 0x05,

    // Integer ALU
    AddInt = 0x10,
    SubInt = 0x11,
    MulInt = 0x12,
    DivInt = 0x13,
    ModInt = 0x14,
    NegInt = 0x15,

    // Float ALU
    AddFloat = 0x18,
    SubFloat = 0x19,
    MulFloat = 0x1A,
    DivFloat = 0x1B,
    NegFloat = 0x1C,

    // Comparisons
    EqInt = 0x20,
    NeInt = 0x21,
    LtInt = 0x22,
    LeInt = 0x23,
    GtInt = 0x24,
    GeInt = 0x25,
    EqFloat = 0x28,
    NeFloat = 0x29,
    LtFloat = 0x2A,
    LeFloat = 0x2B,
    GtFloat = 0x2C,
    GeFloat = 0x2D,

    // Logic and bit twiddling
    NotBool = 0x30,
    BitAnd = 0x31,
    BitOr = 0x32,
    BitXor = 0x33,
    BitNot = 0x34,
    Shl = 0x35,
    Shr = 0x36,

    // Conversions
    IntToFloat = 0x38,
    FloatToInt = 0x39,

    // Memory. Field/index/deref opcodes pop an address computed on the
    // stack; `ADDR_OF_*` and aggregate slot loads produce those addresses.
    /// `operands: [global slot]`
    LoadGlobal = 0x40,
    StoreGlobal = 0x41,
    /// `operands: [frame slot]`
    LoadLocal = 0x42,
    StoreLocal = 0x43,
    /// `operands: [parameter index]`
    LoadParam = 0x44,
    StoreParam = 0x45,
    /// `operands: [byte offset, size]`
    LoadField = 0x46,
    StoreField = 0x47,
    /// `operands: [byte offset, bit offset, bit width]`
    LoadBitfield = 0x48,
    StoreBitfield = 0x49,
    /// `operands: [element size]`
    LoadIndex = 0x4A,
    StoreIndex = 0x4B,
    /// `operands: [global slot]`
    AddrOfGlobal = 0x4C,
    /// `operands: [frame slot]`
    AddrOfLocal = 0x4D,
    /// `operands: [size]`
    LoadDeref = 0x4E,
    StoreDeref = 0x4F,
    /// Reserve a block for an aggregate, push its address. `operands: [size]`
    Alloc = 0x50,

    // Control
    /// `operands: [target pc]`
    Jmp = 0x60,
    JmpIfFalse = 0x61,
    JmpIfTrue = 0x62,
    /// `operands: [function index, argc]`
    Call = 0x63,
    Ret = 0x64,
    RetValue = 0x65,
    Halt = 0x66,

    // RTOS primitives; arguments are on the stack.
    RtosCreateTask = 0x70,
    RtosDeleteTask = 0x71,
    RtosDelayMs = 0x72,
    RtosSemaphoreCreate = 0x73,
    RtosSemaphoreTake = 0x74,
    RtosSemaphoreGive = 0x75,
    RtosYield = 0x76,
    RtosSuspendTask = 0x77,
    RtosResumeTask = 0x78,

    // Hardware primitives; arguments are on the stack.
    HwGpioInit = 0x80,
    HwGpioSet = 0x81,
    HwGpioGet = 0x82,
    HwTimerInit = 0x83,
    HwTimerStart = 0x84,
    HwTimerStop = 0x85,
    HwTimerSetPwmDuty = 0x86,
    HwAdcInit = 0x87,
    HwAdcRead = 0x88,
    HwUartWrite = 0x89,
    HwSpiTransfer = 0x8A,
    HwI2cWrite = 0x8B,
    HwI2cRead = 0x8C,

    // Message queues. `operands: [queue id]`; MSG_RECV_TIMEOUT additionally
    // carries the timeout when it folded to a constant, otherwise the value
    // is taken from the stack.
    MsgSend = 0x90,
    MsgRecv = 0x91,
    MsgRecvTimeout = 0x92,

    // Debug
    DbgPrint = 0xA0,
    /// `operands: [argument count]`
    DbgPrintf = 0xA1,
    DbgBreakpoint = 0xA2,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::PushConst => "PUSH_CONST",
            Opcode::PushInt => "PUSH_INT",
            Opcode::PushBool => "PUSH_BOOL",
            Opcode::Dup => "DUP",
            Opcode::Pop => "POP",
            Opcode::AddInt => "ADD_INT",
            Opcode::SubInt => "SUB_INT",
            Opcode::MulInt => "MUL_INT",
            Opcode::DivInt => "DIV_INT",
            Opcode::ModInt => "MOD_INT",
            Opcode::NegInt => "NEG_INT",
            Opcode::AddFloat => "ADD_FLOAT",
            Opcode::SubFloat => "SUB_FLOAT",
            Opcode::MulFloat => "MUL_FLOAT",
            Opcode::DivFloat => "DIV_FLOAT",
            Opcode::NegFloat => "NEG_FLOAT",
            Opcode::EqInt => "EQ_INT",
            Opcode::NeInt => "NE_INT",
            Opcode::LtInt => "LT_INT",
            Opcode::LeInt => "LE_INT",
            Opcode::GtInt => "GT_INT",
            Opcode::GeInt => "GE_INT",
            Opcode::EqFloat => "EQ_FLOAT",
            Opcode::NeFloat => "NE_FLOAT",
            Opcode::LtFloat => "LT_FLOAT",
            Opcode::LeFloat => "LE_FLOAT",
            Opcode::GtFloat => "GT_FLOAT",
            Opcode::GeFloat => "GE_FLOAT",
            Opcode::NotBool => "NOT_BOOL",
            Opcode::BitAnd => "BIT_AND",
            Opcode::BitOr => "BIT_OR",
            Opcode::BitXor => "BIT_XOR",
            Opcode::BitNot => "BIT_NOT",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::IntToFloat => "INT_TO_FLOAT",
            Opcode::FloatToInt => "FLOAT_TO_INT",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::LoadLocal => "LOAD_LOCAL",
            Opcode::StoreLocal => "STORE_LOCAL",
            Opcode::LoadParam => "LOAD_PARAM",
            Opcode::StoreParam => "STORE_PARAM",
            Opcode::LoadField => "LOAD_FIELD",
            Opcode::StoreField => "STORE_FIELD",
            Opcode::LoadBitfield => "LOAD_BITFIELD",
            Opcode::StoreBitfield => "STORE_BITFIELD",
            Opcode::LoadIndex => "LOAD_INDEX",
            Opcode::StoreIndex => "STORE_INDEX",
            Opcode::AddrOfGlobal => "ADDR_OF_GLOBAL",
            Opcode::AddrOfLocal => "ADDR_OF_LOCAL",
            Opcode::LoadDeref => "LOAD_DEREF",
            Opcode::StoreDeref => "STORE_DEREF",
            Opcode::Alloc => "ALLOC",
            Opcode::Jmp => "JMP",
            Opcode::JmpIfFalse => "JMP_IF_FALSE",
            Opcode::JmpIfTrue => "JMP_IF_TRUE",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::RetValue => "RET_VALUE",
            Opcode::Halt => "HALT",
            Opcode::RtosCreateTask => "RTOS_CREATE_TASK",
            Opcode::RtosDeleteTask => "RTOS_DELETE_TASK",
            Opcode::RtosDelayMs => "RTOS_DELAY_MS",
            Opcode::RtosSemaphoreCreate => "RTOS_SEMAPHORE_CREATE",
            Opcode::RtosSemaphoreTake => "RTOS_SEMAPHORE_TAKE",
            Opcode::RtosSemaphoreGive => "RTOS_SEMAPHORE_GIVE",
            Opcode::RtosYield => "RTOS_YIELD",
            Opcode::RtosSuspendTask => "RTOS_SUSPEND_TASK",
            Opcode::RtosResumeTask => "RTOS_RESUME_TASK",
            Opcode::HwGpioInit => "HW_GPIO_INIT",
            Opcode::HwGpioSet => "HW_GPIO_SET",
            Opcode::HwGpioGet => "HW_GPIO_GET",
            Opcode::HwTimerInit => "HW_TIMER_INIT",
            Opcode::HwTimerStart => "HW_TIMER_START",
            Opcode::HwTimerStop => "HW_TIMER_STOP",
            Opcode::HwTimerSetPwmDuty => "HW_TIMER_SET_PWM_DUTY",
            Opcode::HwAdcInit => "HW_ADC_INIT",
            Opcode::HwAdcRead => "HW_ADC_READ",
            Opcode::HwUartWrite => "HW_UART_WRITE",
            Opcode::HwSpiTransfer => "HW_SPI_TRANSFER",
            Opcode::HwI2cWrite => "HW_I2C_WRITE",
            Opcode::HwI2cRead => "HW_I2C_READ",
            Opcode::MsgSend => "MSG_SEND",
            Opcode::MsgRecv => "MSG_RECV",
            Opcode::MsgRecvTimeout => "MSG_RECV_TIMEOUT",
            Opcode::DbgPrint => "DBG_PRINT",
            Opcode::DbgPrintf => "DBG_PRINTF",
            Opcode::DbgBreakpoint => "DBG_BREAKPOINT",
        }
    }
}

/// Unknown opcode byte; fatal when reading a container back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidOpcode(pub u8);

impl TryFrom<u8> for Opcode {
    type Error = InvalidOpcode;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        let op = match byte {
            0x01 => PushConst,
            0x02 => PushInt,
            0x03 => PushBool,
            0x04 => Dup,
            0x05 => Pop,
            0x10 => AddInt,
            0x11 => SubInt,
            0x12 => MulInt,
            0x13 => DivInt,
            0x14 => ModInt,
            0x15 => NegInt,
            0x18 => AddFloat,
            0x19 => SubFloat,
            0x1A => MulFloat,
            0x1B => DivFloat,
            0x1C => NegFloat,
            0x20 => EqInt,
            0x21 => NeInt,
            0x22 => LtInt,
            0x23 => LeInt,
            0x24 => GtInt,
            0x25 => GeInt,
            0x28 => EqFloat,
            0x29 => NeFloat,
            0x2A => LtFloat,
            0x2B => LeFloat,
            0x2C => GtFloat,
            0x2D => GeFloat,
            0x30 => NotBool,
            0x31 => BitAnd,
            0x32 => BitOr,
            0x33 => BitXor,
            0x34 => BitNot,
            0x35 => Shl,
            0x36 => Shr,
            0x38 => IntToFloat,
            0x39 => FloatToInt,
            0x40 => LoadGlobal,
            0x41 => StoreGlobal,
            0x42 => LoadLocal,
            0x43 => StoreLocal,
            0x44 => LoadParam,
            0x45 => StoreParam,
            0x46 => LoadField,
            0x47 => StoreField,
            0x48 => LoadBitfield,
            0x49 => StoreBitfield,
            0x4A => LoadIndex,
            0x4B => StoreIndex,
            0x4C => AddrOfGlobal,
            0x4D => AddrOfLocal,
            0x4E => LoadDeref,
            0x4F => StoreDeref,
            0x50 => Alloc,
            0x60 => Jmp,
            0x61 => JmpIfFalse,
            0x62 => JmpIfTrue,
            0x63 => Call,
            0x64 => Ret,
            0x65 => RetValue,
            0x66 => Halt,
            0x70 => RtosCreateTask,
            0x71 => RtosDeleteTask,
            0x72 => RtosDelayMs,
            0x73 => RtosSemaphoreCreate,
            0x74 => RtosSemaphoreTake,
            0x75 => RtosSemaphoreGive,
            0x76 => RtosYield,
            0x77 => RtosSuspendTask,
            0x78 => RtosResumeTask,
            0x80 => HwGpioInit,
            0x81 => HwGpioSet,
            0x82 => HwGpioGet,
            0x83 => HwTimerInit,
            0x84 => HwTimerStart,
            0x85 => HwTimerStop,
            0x86 => HwTimerSetPwmDuty,
            0x87 => HwAdcInit,
            0x88 => HwAdcRead,
            0x89 => HwUartWrite,
            0x8A => HwSpiTransfer,
            0x8B => HwI2cWrite,
            0x8C => HwI2cRead,
            0x90 => MsgSend,
            0x91 => MsgRecv,
            0x92 => MsgRecvTimeout,
            0xA0 => DbgPrint,
            0xA1 => DbgPrintf,
            0xA2 => DbgBreakpoint,
            other => return Err(InvalidOpcode(other)),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_opcode_round_trips_through_its_byte() {
        let all = [
            Opcode::PushConst,
            Opcode::PushInt,
            Opcode::PushBool,
            Opcode::Dup,
            Opcode::Pop,
            Opcode::AddInt,
            Opcode::SubInt,
            Opcode::MulInt,
            Opcode::DivInt,
            Opcode::ModInt,
            Opcode::NegInt,
            Opcode::AddFloat,
            Opcode::SubFloat,
            Opcode::MulFloat,
            Opcode::DivFloat,
            Opcode::NegFloat,
            Opcode::EqInt,
            Opcode::NeInt,
            Opcode::LtInt,
            Opcode::LeInt,
            Opcode::GtInt,
            Opcode::GeInt,
            Opcode::EqFloat,
            Opcode::NeFloat,
            Opcode::LtFloat,
            Opcode::LeFloat,
            Opcode::GtFloat,
            Opcode::GeFloat,
            Opcode::NotBool,
            Opcode::BitAnd,
            Opcode::BitOr,
            Opcode::BitXor,
            Opcode::BitNot,
            Opcode::Shl,
            Opcode::Shr,
            Opcode::IntToFloat,
            Opcode::FloatToInt,
            Opcode::LoadGlobal,
            Opcode::StoreGlobal,
            Opcode::LoadLocal,
            Opcode::StoreLocal,
            Opcode::LoadParam,
            Opcode::StoreParam,
            Opcode::LoadField,
            Opcode::StoreField,
            Opcode::LoadBitfield,
            Opcode::StoreBitfield,
            Opcode::LoadIndex,
            Opcode::StoreIndex,
            Opcode::AddrOfGlobal,
            Opcode::AddrOfLocal,
            Opcode::LoadDeref,
            Opcode::StoreDeref,
            Opcode::Alloc,
            Opcode::Jmp,
            Opcode::JmpIfFalse,
            Opcode::JmpIfTrue,
            Opcode::Call,
            Opcode::Ret,
            Opcode::RetValue,
            Opcode::Halt,
            Opcode::RtosCreateTask,
            Opcode::RtosDeleteTask,
            Opcode::RtosDelayMs,
            Opcode::RtosSemaphoreCreate,
            Opcode::RtosSemaphoreTake,
            Opcode::RtosSemaphoreGive,
            Opcode::RtosYield,
            Opcode::RtosSuspendTask,
            Opcode::RtosResumeTask,
            Opcode::HwGpioInit,
            Opcode::HwGpioSet,
            Opcode::HwGpioGet,
            Opcode::HwTimerInit,
            Opcode::HwTimerStart,
            Opcode::HwTimerStop,
            Opcode::HwTimerSetPwmDuty,
            Opcode::HwAdcInit,
            Opcode::HwAdcRead,
            Opcode::HwUartWrite,
            Opcode::HwSpiTransfer,
            Opcode::HwI2cWrite,
            Opcode::HwI2cRead,
            Opcode::MsgSend,
            Opcode::MsgRecv,
            Opcode::MsgRecvTimeout,
            Opcode::DbgPrint,
            Opcode::DbgPrintf,
            Opcode::DbgBreakpoint,
        ];
        for op in all {
            assert_eq!(Opcode::try_from(op as u8), Ok(op), "{}", op.name());
        }
    }

    #[test]
    fn unknown_bytes_are_rejected() {
        assert_eq!(Opcode::try_from(0x00), Err(InvalidOpcode(0x00)));
        assert_eq!(Opcode::try_from(0xFF), Err(InvalidOpcode(0xFF)));
        assert_eq!(Opcode::try_from(0x5F), Err(InvalidOpcode(0x5F)));
    }

    #[test]
    fn intrinsic_table_and_opcode_names_agree() {
        for &intrinsic in crate::intrinsics::Intrinsic::ALL {
            assert_eq!(intrinsic.name(), intrinsic.opcode().name());
        }
    }
}
