//! Assembler error taxonomy: unknown mnemonic, operand out of encoding
//! range, bad directive.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("operand `{operand}` out of encoding range for `{mnemonic}`")]
    OperandOutOfRange { mnemonic: String, operand: String },
    #[error("bad directive `{0}`")]
    BadDirective(String),
}

pub type Result<T> = std::result::Result<T, Error>;
