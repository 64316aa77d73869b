use crate::error::CompileError;
use crate::io;
use crate::request::{Request, RequestType};

/// Images, fonts and JSON data, emitted without compilation. JSON is
/// wrapped into a CommonJS module so scripts can `require` it.
#[derive(Debug)]
pub struct StaticFile {
    request: Request,
}

impl StaticFile {
    pub fn new(request: Request) -> Self {
        Self { request }
    }

    fn is_json(&self) -> bool {
        self.request.request_type == RequestType::Json
    }

    fn dest(&self) -> (camino::Utf8PathBuf, camino::Utf8PathBuf) {
        if self.is_json() {
            (
                format!("{}.js", self.request.dest).into(),
                format!("{}.js", self.request.dest_relative).into(),
            )
        } else {
            (self.request.dest.clone(), self.request.dest_relative.clone())
        }
    }

    pub fn save(&self) -> Result<(), CompileError> {
        let (dest, dest_relative) = self.dest();
        if self.is_json() {
            let content = std::fs::read_to_string(&self.request.src)?;
            io::write(&dest, format!("module.exports = {}", content.trim_end()))?;
            tracing::info!("write {}", dest_relative);
        } else {
            io::copy(&self.request.src, &dest)?;
            tracing::info!("copy {}", dest_relative);
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<(), CompileError> {
        let (dest, dest_relative) = self.dest();
        io::remove(&dest)?;
        tracing::info!("delete {}", dest_relative);
        Ok(())
    }
}
