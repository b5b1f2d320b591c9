use crate::framemgr::FrameState;
use crate::interface::IrqClass;

/// Errors surfaced by the FIMC-IS driver.
///
/// None of these trigger an automatic retry: a mailbox timeout leaves the
/// pipeline in whatever state it reached and the caller is expected to close
/// and reopen the device if the failure persists.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FimcIsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("operation not allowed in the current state")]
    InvalidState,
    #[error("command {command:#x} timed out")]
    Timeout { command: u32 },
    #[error("hardware busy")]
    Busy,
    #[error("firmware rejected command {command:#x} (code {code:#x})")]
    Rejected { command: u32, code: u32 },
    #[error("reply for {got:#x} while waiting for {expected:#x}")]
    UnexpectedReply { expected: u32, got: u32 },
    #[error("no free work item in the {0:?} pool")]
    NoFreeWork(WorkPool),
    #[error("frame accounting: no frame to move from {from:?} to {to:?}")]
    FrameAccounting { from: FrameState, to: FrameState },
    #[error("out of memory")]
    NoMemory,
    #[error("firmware: {0}")]
    Firmware(FirmwareError),
    #[error("operation not supported")]
    Unsupported,
    #[error("platform callback failed")]
    Platform,
}

/// Which work-item pool ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkPool {
    Irq(IrqClass),
    Shot,
    CamCtrl,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("file not found")]
    NotFound,
    #[error("image of {size} bytes does not fit in {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("image too short to carry version info")]
    Truncated,
    #[error("setfile offset {offset:#x} outside the firmware area")]
    BadSetfileOffset { offset: u32 },
    #[error("no init message from the ISP core")]
    NoInitMessage,
}

impl From<FirmwareError> for FimcIsError {
    fn from(err: FirmwareError) -> Self {
        FimcIsError::Firmware(err)
    }
}

const EIO: i32 = 5;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const EINVAL: i32 = 22;
const ENOENT: i32 = 2;
const ENOSYS: i32 = 38;

impl FimcIsError {
    /// Negative errno handed back through the ioctl surface.
    pub fn errno(&self) -> i32 {
        let code = match self {
            FimcIsError::InvalidArgument
            | FimcIsError::InvalidState
            | FimcIsError::FrameAccounting { .. } => EINVAL,
            FimcIsError::Timeout { .. } | FimcIsError::Busy | FimcIsError::NoFreeWork(_) => EBUSY,
            FimcIsError::Rejected { .. }
            | FimcIsError::UnexpectedReply { .. }
            | FimcIsError::Platform => EIO,
            FimcIsError::NoMemory => ENOMEM,
            FimcIsError::Firmware(FirmwareError::NotFound) => ENOENT,
            FimcIsError::Firmware(_) => EINVAL,
            FimcIsError::Unsupported => ENOSYS,
        };
        -code
    }
}

pub type Result<T> = core::result::Result<T, FimcIsError>;
