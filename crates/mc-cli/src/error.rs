use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse machine manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("userdata {} is not valid UTF-8: {source}", path.display())]
    UserdataEncoding {
        path: PathBuf,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error(transparent)]
    Cloud(#[from] mc_cloud::Error),

    #[error(transparent)]
    Userdata(#[from] mc_userdata::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] serde_json::Error),
}

impl Error {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Cloud(e) if e.is_terminal())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn read(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}
