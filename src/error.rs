use thiserror::Error;

/// Every way a ballistic operation can fail.
///
/// Initialization and teardown paths return these directly; the hot
/// translation paths instead latch the first failure into the engine (or
/// assembler) status and silently skip all further work until a reset.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("function argument is missing or out of range")]
    InvalidArgument,
    #[error("failed to allocate memory")]
    AllocationFailed,
    #[error("buffer is not aligned to the required memory alignment")]
    MemoryAlignment,
    #[error("engine is uninitialized or holds a latched error")]
    EngineStateInvalid,
    #[error("failed to decode arm instruction")]
    UnknownInstruction,
    #[error("instruction or constant capacity exceeded")]
    InstructionOverflow,
}

impl Error {
    /// Stable numeric identifier for this error kind. Success is 0; all
    /// errors are negative.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument => -1,
            Error::AllocationFailed => -2,
            Error::MemoryAlignment => -3,
            Error::EngineStateInvalid => -4,
            Error::UnknownInstruction => -5,
            Error::InstructionOverflow => -100,
        }
    }
}
