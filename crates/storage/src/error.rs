use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("failed to create storage directory at {path} on `{stage}`: {source}"))]
    CreateDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read {path} on `{stage}`: {source}"))]
    ReadFile {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write {path} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace {to} with {from} on `{stage}`: {source}"))]
    RenameTempFile {
        stage: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize json on `{stage}`: {source}"))]
    SerializeJson {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to parse json from {path} on `{stage}`: {source}"))]
    ParseJson {
        stage: &'static str,
        path: String,
        source: serde_json::Error,
    },
    #[snafu(display("expected a json object in {path} on `{stage}`"))]
    NotAnObject { stage: &'static str, path: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
