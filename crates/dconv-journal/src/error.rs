use std::io;

#[derive(Debug, Fail)]
pub enum JournalError {
    #[fail(display = "unable to locate a home directory to resolve the journal path")]
    NoHomeDirectory,
    #[fail(display = "journal field {:?} is missing or malformed", field)]
    MalformedField { field: String },
    #[fail(display = "{}", why)]
    Io { why: io::Error },
}

impl From<io::Error> for JournalError {
    fn from(why: io::Error) -> JournalError { JournalError::Io { why } }
}
