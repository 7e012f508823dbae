//! Built-in hardware, RTOS and debug functions.
//!
//! Each intrinsic is a reserved name that lowers to a dedicated opcode
//! instead of a general `CALL`. Adding one means adding a variant here, a row
//! in [`Intrinsic::signature`], and an opcode number — the parser and the
//! rest of the pipeline pick it up through this table.

use crate::bytecode::op::Opcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    // RTOS
    RtosCreateTask,
    RtosDeleteTask,
    RtosDelayMs,
    RtosSemaphoreCreate,
    RtosSemaphoreTake,
    RtosSemaphoreGive,
    RtosYield,
    RtosSuspendTask,
    RtosResumeTask,
    // Hardware
    HwGpioInit,
    HwGpioSet,
    HwGpioGet,
    HwTimerInit,
    HwTimerStart,
    HwTimerStop,
    HwTimerSetPwmDuty,
    HwAdcInit,
    HwAdcRead,
    HwUartWrite,
    HwSpiTransfer,
    HwI2cWrite,
    HwI2cRead,
    // Debug
    DbgPrint,
    DbgPrintf,
    DbgBreakpoint,
}

/// Parameter and return types as the signature table sees them. The semantic
/// analyzer maps these onto its interned type descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
    Void,
    /// Handle returned by `RTOS_CREATE_TASK` / accepted by suspend, resume
    /// and delete.
    Task,
    /// A `void`-returning, zero-parameter function used as a task entry.
    TaskEntry,
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub params: &'static [ParamKind],
    pub ret: ParamKind,
    /// Extra arguments beyond `params` are allowed (format-style calls).
    pub variadic: bool,
}

const fn sig(params: &'static [ParamKind], ret: ParamKind) -> Signature {
    Signature {
        params,
        ret,
        variadic: false,
    }
}

impl Intrinsic {
    pub const ALL: &'static [Intrinsic] = &[
        Intrinsic::RtosCreateTask,
        Intrinsic::RtosDeleteTask,
        Intrinsic::RtosDelayMs,
        Intrinsic::RtosSemaphoreCreate,
        Intrinsic::RtosSemaphoreTake,
        Intrinsic::RtosSemaphoreGive,
        Intrinsic::RtosYield,
        Intrinsic::RtosSuspendTask,
        Intrinsic::RtosResumeTask,
        Intrinsic::HwGpioInit,
        Intrinsic::HwGpioSet,
        Intrinsic::HwGpioGet,
        Intrinsic::HwTimerInit,
        Intrinsic::HwTimerStart,
        Intrinsic::HwTimerStop,
        Intrinsic::HwTimerSetPwmDuty,
        Intrinsic::HwAdcInit,
        Intrinsic::HwAdcRead,
        Intrinsic::HwUartWrite,
        Intrinsic::HwSpiTransfer,
        Intrinsic::HwI2cWrite,
        Intrinsic::HwI2cRead,
        Intrinsic::DbgPrint,
        Intrinsic::DbgPrintf,
        Intrinsic::DbgBreakpoint,
    ];

    /// Source-level reserved name.
    pub fn name(self) -> &'static str {
        match self {
            Intrinsic::RtosCreateTask => "RTOS_CREATE_TASK",
            Intrinsic::RtosDeleteTask => "RTOS_DELETE_TASK",
            Intrinsic::RtosDelayMs => "RTOS_DELAY_MS",
            Intrinsic::RtosSemaphoreCreate => "RTOS_SEMAPHORE_CREATE",
            Intrinsic::RtosSemaphoreTake => "RTOS_SEMAPHORE_TAKE",
            Intrinsic::RtosSemaphoreGive => "RTOS_SEMAPHORE_GIVE",
            Intrinsic::RtosYield => "RTOS_YIELD",
            Intrinsic::RtosSuspendTask => "RTOS_SUSPEND_TASK",
            Intrinsic::RtosResumeTask => "RTOS_RESUME_TASK",
            Intrinsic::HwGpioInit => "HW_GPIO_INIT",
            Intrinsic::HwGpioSet => "HW_GPIO_SET",
            Intrinsic::HwGpioGet => "HW_GPIO_GET",
            Intrinsic::HwTimerInit => "HW_TIMER_INIT",
            Intrinsic::HwTimerStart => "HW_TIMER_START",
            Intrinsic::HwTimerStop => "HW_TIMER_STOP",
            Intrinsic::HwTimerSetPwmDuty => "HW_TIMER_SET_PWM_DUTY",
            Intrinsic::HwAdcInit => "HW_ADC_INIT",
            Intrinsic::HwAdcRead => "HW_ADC_READ",
            Intrinsic::HwUartWrite => "HW_UART_WRITE",
            Intrinsic::HwSpiTransfer => "HW_SPI_TRANSFER",
            Intrinsic::HwI2cWrite => "HW_I2C_WRITE",
            Intrinsic::HwI2cRead => "HW_I2C_READ",
            Intrinsic::DbgPrint => "DBG_PRINT",
            Intrinsic::DbgPrintf => "DBG_PRINTF",
            Intrinsic::DbgBreakpoint => "DBG_BREAKPOINT",
        }
    }

    /// Reverse lookup used by the lexer's reserved-word mapping.
    pub fn from_name(name: &str) -> Option<Intrinsic> {
        Intrinsic::ALL.iter().copied().find(|i| i.name() == name)
    }

    pub fn signature(self) -> Signature {
        use ParamKind::*;
        match self {
            Intrinsic::RtosCreateTask => sig(&[TaskEntry, Str, Int, Int, Int], Task),
            Intrinsic::RtosDeleteTask => sig(&[Task], Void),
            Intrinsic::RtosDelayMs => sig(&[Int], Void),
            Intrinsic::RtosSemaphoreCreate => sig(&[], Int),
            Intrinsic::RtosSemaphoreTake => sig(&[Int, Int], Int),
            Intrinsic::RtosSemaphoreGive => sig(&[Int], Void),
            Intrinsic::RtosYield => sig(&[], Void),
            Intrinsic::RtosSuspendTask => sig(&[Task], Void),
            Intrinsic::RtosResumeTask => sig(&[Task], Void),
            Intrinsic::HwGpioInit => sig(&[Int, Int], Void),
            Intrinsic::HwGpioSet => sig(&[Int, Int], Void),
            Intrinsic::HwGpioGet => sig(&[Int], Int),
            Intrinsic::HwTimerInit => sig(&[Int, Int], Void),
            Intrinsic::HwTimerStart => sig(&[Int], Void),
            Intrinsic::HwTimerStop => sig(&[Int], Void),
            Intrinsic::HwTimerSetPwmDuty => sig(&[Int, Int], Void),
            Intrinsic::HwAdcInit => sig(&[Int], Void),
            Intrinsic::HwAdcRead => sig(&[Int], Int),
            Intrinsic::HwUartWrite => sig(&[Str], Void),
            Intrinsic::HwSpiTransfer => sig(&[Int], Int),
            Intrinsic::HwI2cWrite => sig(&[Int, Int], Void),
            Intrinsic::HwI2cRead => sig(&[Int], Int),
            Intrinsic::DbgPrint => sig(&[Str], Void),
            Intrinsic::DbgPrintf => Signature {
                params: &[Str],
                ret: Void,
                variadic: true,
            },
            Intrinsic::DbgBreakpoint => sig(&[], Void),
        }
    }

    /// The dedicated opcode this intrinsic lowers to.
    pub fn opcode(self) -> Opcode {
        match self {
            Intrinsic::RtosCreateTask => Opcode::RtosCreateTask,
            Intrinsic::RtosDeleteTask => Opcode::RtosDeleteTask,
            Intrinsic::RtosDelayMs => Opcode::RtosDelayMs,
            Intrinsic::RtosSemaphoreCreate => Opcode::RtosSemaphoreCreate,
            Intrinsic::RtosSemaphoreTake => Opcode::RtosSemaphoreTake,
            Intrinsic::RtosSemaphoreGive => Opcode::RtosSemaphoreGive,
            Intrinsic::RtosYield => Opcode::RtosYield,
            Intrinsic::RtosSuspendTask => Opcode::RtosSuspendTask,
            Intrinsic::RtosResumeTask => Opcode::RtosResumeTask,
            Intrinsic::HwGpioInit => Opcode::HwGpioInit,
            Intrinsic::HwGpioSet => Opcode::HwGpioSet,
            Intrinsic::HwGpioGet => Opcode::HwGpioGet,
            Intrinsic::HwTimerInit => Opcode::HwTimerInit,
            Intrinsic::HwTimerStart => Opcode::HwTimerStart,
            Intrinsic::HwTimerStop => Opcode::HwTimerStop,
            Intrinsic::HwTimerSetPwmDuty => Opcode::HwTimerSetPwmDuty,
            Intrinsic::HwAdcInit => Opcode::HwAdcInit,
            Intrinsic::HwAdcRead => Opcode::HwAdcRead,
            Intrinsic::HwUartWrite => Opcode::HwUartWrite,
            Intrinsic::HwSpiTransfer => Opcode::HwSpiTransfer,
            Intrinsic::HwI2cWrite => Opcode::HwI2cWrite,
            Intrinsic::HwI2cRead => Opcode::HwI2cRead,
            Intrinsic::DbgPrint => Opcode::DbgPrint,
            Intrinsic::DbgPrintf => Opcode::DbgPrintf,
            Intrinsic::DbgBreakpoint => Opcode::DbgBreakpoint,
        }
    }
}
