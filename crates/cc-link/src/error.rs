//! Linker error taxonomy.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("multiple definition of `{0}`")]
    MultipleDefinition(String),
    #[error("undefined reference to `{0}`")]
    UndefinedReference(String),
    #[error("relocation against `{symbol}` ({kind:?}) overflows its encoding range")]
    RelocationOverflow { symbol: String, kind: cc_elf::RelocKind },
    #[error("malformed object: {0}")]
    MalformedElf(#[from] cc_elf::ElfError),
}

pub type Result<T> = std::result::Result<T, Error>;
