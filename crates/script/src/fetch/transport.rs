//! Access to the remote repository.
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use url::Url;

use super::Error;

//================================================================================================
// Types
//================================================================================================

/// An open artifact stream.
pub struct Download {
    /// Length announced by the transport, if any.
    pub content_length: Option<u64>,
    /// The artifact bytes.
    pub reader: Box<dyn Read + Send>,
}

/// Reads artifacts out of a repository by sub-path.
pub trait Transport: Sync {
    /// Opens the artifact at `sub_path`.
    fn open(&self, sub_path: &str) -> Result<Download, Error>;
}

/// A repository served over `http(s)://`.
pub struct HttpTransport {
    client: Client,
    base: Url,
}

/// A repository in a local directory, addressed by a `file://` url.
pub struct FileTransport {
    root: PathBuf,
}

//================================================================================================
// Impls
//================================================================================================

impl HttpTransport {
    /// A transport rooted at `base`.
    pub fn new(base: &Url) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(concat!("kotlin_script/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpTransport {
            client,
            base: directory_url(base),
        })
    }

    fn url(&self, sub_path: &str) -> Result<Url, Error> {
        self.base
            .join(sub_path)
            .map_err(|_| Error::UnsupportedUrl(self.base.to_string()))
    }
}

impl Transport for HttpTransport {
    fn open(&self, sub_path: &str) -> Result<Download, Error> {
        let url = self.url(sub_path)?;
        tracing::debug!(%url, "fetch");
        let response = self.client.get(url.clone()).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.to_string()));
        }
        let response = response.error_for_status()?;
        Ok(Download {
            content_length: response.content_length(),
            reader: Box::new(response),
        })
    }
}

impl FileTransport {
    /// A transport reading below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileTransport { root: root.into() }
    }
}

impl Transport for FileTransport {
    fn open(&self, sub_path: &str) -> Result<Download, Error> {
        let path = self.root.join(sub_path);
        tracing::debug!(path = %path.display(), "fetch");
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        Ok(Download {
            content_length: Some(file.metadata()?.len()),
            reader: Box::new(file),
        })
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Picks the transport matching the scheme of `url`.
pub fn for_url(url: &Url) -> Result<Box<dyn Transport>, Error> {
    match url.scheme() {
        "http" | "https" => Ok(Box::new(HttpTransport::new(url)?)),
        "file" => url
            .to_file_path()
            .map(|root| Box::new(FileTransport::new(root)) as Box<dyn Transport>)
            .map_err(|_| Error::UnsupportedUrl(url.to_string())),
        _ => Err(Error::UnsupportedUrl(url.to_string())),
    }
}

/// `url` with a trailing slash, so joining appends instead of replacing the last segment.
fn directory_url(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_last_segment() -> anyhow::Result<()> {
        let t = HttpTransport::new(&Url::parse("https://repo1.maven.org/maven2")?)?;
        assert_eq!(
            t.url("g/a/1/a-1.jar")?.as_str(),
            "https://repo1.maven.org/maven2/g/a/1/a-1.jar"
        );
        Ok(())
    }

    #[test]
    fn file_url() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("g/a/1"))?;
        std::fs::write(dir.path().join("g/a/1/a-1.jar"), b"abc")?;
        let transport = for_url(&Url::from_directory_path(dir.path()).map_err(|_| anyhow::anyhow!("url"))?)?;

        let mut download = transport.open("g/a/1/a-1.jar")?;
        assert_eq!(download.content_length, Some(3));
        let mut buf = Vec::new();
        download.reader.read_to_end(&mut buf)?;
        assert_eq!(buf, b"abc");

        assert!(matches!(transport.open("g/a/2/a-2.jar"), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn unsupported_scheme() -> anyhow::Result<()> {
        assert!(matches!(
            for_url(&Url::parse("ftp://example.org/m2")?),
            Err(Error::UnsupportedUrl(_))
        ));
        Ok(())
    }
}
