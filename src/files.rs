//! File tree operations on the device's LittleFS storage.

use crate::listing::{self, DirectoryEntry};
use crate::protocol::{CommandFrame, MODULE_FILE};
use crate::transfer::{DownloadSession, UploadSession};
use crate::{Error, Link, Transport};

impl<T: Transport> Link<T> {
    /// Fetch the complete recursive listing of the device tree.
    ///
    /// Pair with [`listing::dir_view`] for a single-directory view.
    pub fn list_tree(&mut self) -> Result<Vec<DirectoryEntry>, Error<T::Error>> {
        let rsp = self.request(&CommandFrame::bare(MODULE_FILE, "FILE list"))?;
        listing::parse_listing(&rsp.message)
    }

    /// Delete a single file.
    pub fn remove_file(&mut self, path: &str) -> Result<(), Error<T::Error>> {
        self.request(&CommandFrame::plain(MODULE_FILE, "FILE delete").with_arg(path))?;
        info!("deleted {}", path);
        Ok(())
    }

    /// Delete a directory including its content.
    pub fn remove_dir(&mut self, path: &str) -> Result<(), Error<T::Error>> {
        self.request(&CommandFrame::plain(MODULE_FILE, "FILE rmdir").with_arg(path))?;
        info!("removed directory {}", path);
        Ok(())
    }

    /// Create a directory.
    pub fn make_dir(&mut self, path: &str) -> Result<(), Error<T::Error>> {
        self.request(&CommandFrame::plain(MODULE_FILE, "FILE mkdir").with_arg(path))?;
        info!("created directory {}", path);
        Ok(())
    }

    /// Upload `data` to the device path, reporting progress per chunk.
    pub fn upload<F>(&mut self, path: &str, data: Vec<u8>, progress: F) -> Result<(), Error<T::Error>>
    where
        F: FnMut(u32, u32),
    {
        UploadSession::new(path, data).run(self, progress)
    }

    /// Download the device file at `path`, reporting progress per chunk.
    pub fn download<F>(&mut self, path: &str, progress: F) -> Result<Vec<u8>, Error<T::Error>>
    where
        F: FnMut(u32, u32),
    {
        DownloadSession::new(path).run(self, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::EntryKind;
    use crate::testutil::ScriptedPort;

    #[test]
    fn list_tree_parses_the_flat_listing() {
        let port = ScriptedPort::new(vec![
            "A:F0,FILE list#OK-directory of LittleFS:\n/cfg/\n/cfg/config.json*88\n#",
        ]);
        let mut link = Link::new(port);

        let entries = link.list_tree().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].path, "/");
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert_eq!(entries[2].size, Some(88));

        assert_eq!(link.into_inner().sent, vec!["S:F0,FILE list#"]);
    }

    #[test]
    fn maintenance_commands_carry_the_quoted_path() {
        let port = ScriptedPort::new(vec![
            "A:F0,FILE delete,0,0,0,0,\"/x\"#OK-#",
            "A:F0,FILE mkdir,0,0,0,0,\"/d\"#OK-#",
            "A:F0,FILE rmdir,0,0,0,0,\"/d/\"#OK-#",
        ]);
        let mut link = Link::new(port);

        link.remove_file("/x").unwrap();
        link.make_dir("/d").unwrap();
        link.remove_dir("/d/").unwrap();

        let port = link.into_inner();
        assert_eq!(port.sent[0], "S:F0,FILE delete,0,0,0,0,\"/x\"#");
        assert_eq!(port.sent[1], "S:F0,FILE mkdir,0,0,0,0,\"/d\"#");
        assert_eq!(port.sent[2], "S:F0,FILE rmdir,0,0,0,0,\"/d/\"#");
    }

    #[test]
    fn device_refusal_surfaces_as_not_ok() {
        let port = ScriptedPort::new(vec!["A:F0,FILE delete,0,0,0,0#Error: File does not exist.#"]);
        let mut link = Link::new(port);

        let err = link.remove_file("/missing").unwrap_err();
        match err {
            Error::NotOk(msg) => assert_eq!(msg, "Error: File does not exist."),
            other => panic!("expected NotOk, got {:?}", other),
        }
    }
}
