use std::fs::File;
use std::os::fd::{BorrowedFd, RawFd};
use std::path::Path;

use anyhow::{Context, Result, bail};
use idmap::{ApkZipReader, HeaderOnlyIndex, IdmapManager, LockMode};

/// Split `TARGET OVERLAY FD` and take over the inherited descriptor
fn parse_args(args: &[String]) -> Result<(&Path, &Path, File)> {
    let [target, overlay, fd] = args else {
        bail!("expected TARGET OVERLAY FD, got {} arguments", args.len());
    };

    Ok((Path::new(target), Path::new(overlay), file_from_fd(fd)?))
}

fn file_from_fd(arg: &str) -> Result<File> {
    let fd: RawFd = arg
        .parse()
        .with_context(|| format!("not a file descriptor: {:?}", arg))?;
    if fd < 0 {
        bail!("not a file descriptor: {}", fd);
    }

    // SAFETY: the descriptor is handed down open by the parent process and
    // stays open for the lifetime of this process; we only duplicate it.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let owned = borrowed
        .try_clone_to_owned()
        .with_context(|| format!("file descriptor {} is not open", fd))?;

    Ok(File::from(owned))
}

pub(crate) fn command_fd(args: &[String], lock_mode: LockMode) -> Result<()> {
    let (target, overlay, file) = parse_args(args)?;

    let index = HeaderOnlyIndex::default();
    let manager = IdmapManager::new(&ApkZipReader, &index).with_lock_mode(lock_mode);

    manager
        .create_fd(target, overlay, &file)
        .with_context(|| format!("failed to write idmap for {:?} to fd {}", overlay, args[2]))
}

/// `Ok(true)` if the idmap behind the descriptor is up to date
pub(crate) fn command_verify(args: &[String]) -> Result<bool> {
    let (target, overlay, file) = parse_args(args)?;

    let index = HeaderOnlyIndex::default();
    let manager = IdmapManager::new(&ApkZipReader, &index);

    Ok(manager.verify_fd(target, overlay, &file))
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn rejects_bad_descriptors() {
        assert!(file_from_fd("stdout").is_err());
        assert!(file_from_fd("-1").is_err());
        assert!(parse_args(&["a".to_owned(), "b".to_owned()]).is_err());
    }

    #[test]
    fn duplicates_open_descriptor() {
        let tmp = tempfile::tempfile().unwrap();
        let raw = tmp.as_raw_fd().to_string();

        let args = ["/t.apk".to_owned(), "/o.apk".to_owned(), raw];
        let (target, overlay, file) = parse_args(&args).unwrap();
        assert_eq!(target, Path::new("/t.apk"));
        assert_eq!(overlay, Path::new("/o.apk"));
        assert_ne!(file.as_raw_fd(), tmp.as_raw_fd());
    }
}
