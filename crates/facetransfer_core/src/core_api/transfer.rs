use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::Result;
use crate::merge::{check_compatible, merge_with};
use crate::save::SaveFile;

use super::engine::Engine;
use super::types::{Summary, TransferOptions, TransferOutcome};

const BACKUP_SUFFIX: &str = ".facebak";

/// Merges `source`'s face into `target` and returns the new target bytes.
/// Nothing touches the disk.
pub fn plan_face_transfer(
    source: &[u8],
    target: &[u8],
    options: &TransferOptions,
) -> Result<Vec<u8>> {
    let source = SaveFile::decode(source)?;
    let mut target = SaveFile::decode(target)?;
    if options.check_compatibility {
        check_compatible(&source, &target)?;
    }

    let donor = source.player()?;
    let recipient = target.player()?;
    let (merged, flags) = merge_with(
        &donor.actor,
        donor.flags(),
        &recipient.actor,
        recipient.flags(),
        &target.form_context(),
        options.merge,
    )?;
    debug!("player flags {} -> {flags}", recipient.flags());

    target.replace_player(&merged, flags)?;
    target.encode()
}

pub fn get_summary(path: impl AsRef<Path>) -> Result<Summary> {
    Engine::new().open_path(path, None).map(|s| s.summary())
}

/// [`transfer_face_with`] using default options.
pub fn transfer_face(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
) -> Result<TransferOutcome> {
    transfer_face_with(source, target, &TransferOptions::default())
}

/// Plans the transfer and writes the merged bytes over `target`, keeping
/// the original as a numbered backup when `options.keep_backup` is set.
pub fn transfer_face_with(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    options: &TransferOptions,
) -> Result<TransferOutcome> {
    transfer_face_into(source, target, None, options)
}

/// As [`transfer_face_with`], but an `output` path receives the merged
/// bytes instead and `target` is left untouched.
pub fn transfer_face_into(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    output: Option<&Path>,
    options: &TransferOptions,
) -> Result<TransferOutcome> {
    let target = target.as_ref();
    let source_bytes = fs::read(source)?;
    let target_bytes = fs::read(target)?;
    let merged = plan_face_transfer(&source_bytes, &target_bytes, options)?;

    let (written_to, backup) = match output {
        Some(path) => (path.to_path_buf(), None),
        None if options.keep_backup => {
            let backup = numbered_backup_path(target);
            fs::rename(target, &backup)?;
            (target.to_path_buf(), Some(backup))
        }
        None => (target.to_path_buf(), None),
    };
    fs::write(&written_to, &merged)?;

    match &backup {
        Some(backup) => info!(
            "wrote {} bytes to {}, original kept as {}",
            merged.len(),
            written_to.display(),
            backup.display()
        ),
        None => info!("wrote {} bytes to {}", merged.len(), written_to.display()),
    }

    Ok(TransferOutcome {
        target: target.to_path_buf(),
        written_to,
        backup,
        bytes_written: merged.len(),
    })
}

/// `<target>.facebak<N>` for the smallest N not already taken.
pub fn numbered_backup_path(target: &Path) -> PathBuf {
    let mut n = 0u32;
    loop {
        let mut name = target.as_os_str().to_owned();
        name.push(format!("{BACKUP_SUFFIX}{n}"));
        let candidate = PathBuf::from(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
