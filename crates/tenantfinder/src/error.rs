use derive_more::From;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    // -- Configuration
    NoInput,
    VerboseAndSilent,
    ZeroTimeout,
    ZeroEnumerationTime,
    DuplicateSource(String),
    UnknownRateLimitSource(String),
    InvalidRateLimit(String),

    // -- Sources
    InvalidHttpResponse(String),
    Federation(String),
    Cancelled,

    #[from]
    File(std::io::Error),

    #[from]
    Reqwest(reqwest::Error),

    #[from]
    SerdeJson(serde_json::Error),

    #[from]
    Xml(quick_xml::Error),

    #[from]
    Subscriber(tracing::subscriber::SetGlobalDefaultError),
}

// region:    --- Error Boilerplate

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl std::error::Error for Error {}

// endregion: --- Error Boilerplate
