//! Disk image volumes attached through `hdiutil`.
//!
//! The manager remembers which mount points it attached itself and which
//! were already mounted before the run. Only the former are ever detached.

use crate::process::{CommandRunner, Invocation};
use crate::RuntimeError;
use plist::{Dictionary, Value};
use quickpkg_schema::{extract_embedded_document, normalize_lexically, parse_dictionary};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub const HDIUTIL: &str = "/usr/bin/hdiutil";

const MOUNT_ROOT: &str = "/private/tmp";
const MOUNTABLE_KINDS: &[&str] = &["hfs", "apfs"];
const LICENSE_ACCEPTANCE: &str = "Y\n";

#[derive(Debug, Default)]
struct MountState {
    /// Every mount point seen this run, flagged `true` when it was mounted
    /// before we got to it.
    pre_existing: HashMap<PathBuf, bool>,
    /// Mount points attached by this manager, in attach order.
    attached: Vec<PathBuf>,
}

impl MountState {
    fn is_pre_existing(&self, mount_point: &Path) -> bool {
        self.pre_existing.get(mount_point).copied().unwrap_or(false)
    }

    fn forget(&mut self, mount_point: &Path) {
        self.pre_existing.remove(mount_point);
        self.attached.retain(|p| p != mount_point);
    }
}

pub struct VolumeManager {
    runner: Arc<dyn CommandRunner>,
    state: Mutex<MountState>,
}

impl VolumeManager {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            state: Mutex::new(MountState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MountState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::StatePoisoned(format!("volume state: {e}")))
    }

    /// Whether the image carries a software license agreement that
    /// `hdiutil attach` will ask to accept.
    pub fn has_license_agreement(&self, image: &Path) -> Result<bool, RuntimeError> {
        let inv = Invocation::new(HDIUTIL)
            .arg("imageinfo")
            .arg_path(image)
            .arg("-plist");
        let result = self.runner.run_checked(&inv)?;
        let document = extract_embedded_document(&result.stdout)?;
        let info = parse_dictionary(document.as_bytes())?;
        Ok(info
            .get("Properties")
            .and_then(Value::as_dictionary)
            .and_then(|props| props.get("Software License Agreement"))
            .and_then(Value::as_boolean)
            .unwrap_or(false))
    }

    /// Mount points of `image` when the system already has it attached.
    ///
    /// Every returned mount point is recorded as pre-existing and will never
    /// be detached by this manager.
    pub fn existing_mount_points(
        &self,
        image: &Path,
    ) -> Result<Option<Vec<PathBuf>>, RuntimeError> {
        let mut state = self.lock()?;
        self.find_existing(&mut state, image)
    }

    fn find_existing(
        &self,
        state: &mut MountState,
        image: &Path,
    ) -> Result<Option<Vec<PathBuf>>, RuntimeError> {
        let inv = Invocation::new(HDIUTIL).args(["info", "-plist"]);
        let result = self.runner.run_checked(&inv)?;
        let document = extract_embedded_document(&result.stdout)?;
        let registry = parse_dictionary(document.as_bytes())?;

        let Some(images) = registry.get("images").and_then(Value::as_array) else {
            return Ok(None);
        };

        for entry in images.iter().filter_map(Value::as_dictionary) {
            let Some(image_path) = entry.get("image-path").and_then(Value::as_string) else {
                continue;
            };
            if !same_image(Path::new(image_path), image) {
                continue;
            }
            let mount_points: Vec<PathBuf> = entities(entry).filter_map(mount_point).collect();
            if mount_points.is_empty() {
                continue;
            }
            for mp in &mount_points {
                debug!("{} already mounted at {}", image.display(), mp.display());
                // A mount point attached earlier in this run stays ours.
                state.pre_existing.entry(mp.clone()).or_insert(true);
            }
            return Ok(Some(mount_points));
        }
        Ok(None)
    }

    /// Attach `image` and return its mountable volumes.
    ///
    /// An image that is already attached is reused as-is.
    pub fn attach(&self, image: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
        let mut state = self.lock()?;
        if let Some(existing) = self.find_existing(&mut state, image)? {
            info!("using existing mount of {}", image.display());
            return Ok(existing);
        }

        let mut inv = Invocation::new(HDIUTIL)
            .arg("attach")
            .arg_path(image)
            .args(["-mountrandom", MOUNT_ROOT, "-plist", "-nobrowse"]);
        if self.has_license_agreement(image)? {
            warn!(
                "{} has a software license agreement, accepting it to mount",
                image.display()
            );
            inv = inv.stdin(LICENSE_ACCEPTANCE);
        }

        let result = self.runner.run(&inv)?;
        if !result.success() {
            return Err(RuntimeError::MountFailed(format!(
                "{} (exit {}): {}",
                image.display(),
                result.exit_code,
                result.stderr
            )));
        }

        let document = extract_embedded_document(&result.stdout)?;
        let attached = parse_dictionary(document.as_bytes())?;
        let mount_points: Vec<PathBuf> = entities(&attached)
            .filter(|entity| is_mountable(entity))
            .filter_map(mount_point)
            .collect();

        for mp in &mount_points {
            debug!("attached {} at {}", image.display(), mp.display());
            state.pre_existing.insert(mp.clone(), false);
            state.attached.push(mp.clone());
        }
        if mount_points.is_empty() {
            warn!("{} attached without a mountable volume", image.display());
        }
        Ok(mount_points)
    }

    /// Detach a mount point this manager attached.
    ///
    /// Pre-existing mounts are left alone. A failing `hdiutil detach` is only
    /// logged.
    pub fn detach(&self, mount_point: &Path) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        self.detach_locked(&mut state, mount_point)
    }

    fn detach_locked(
        &self,
        state: &mut MountState,
        mount_point: &Path,
    ) -> Result<(), RuntimeError> {
        if state.is_pre_existing(mount_point) {
            debug!("leaving pre-existing mount {}", mount_point.display());
            return Ok(());
        }
        if !mount_point.exists() {
            debug!("{} is already gone", mount_point.display());
            state.forget(mount_point);
            return Ok(());
        }

        let inv = Invocation::new(HDIUTIL).arg("detach").arg_path(mount_point);
        let result = self.runner.run(&inv)?;
        if result.success() {
            debug!("detached {}", mount_point.display());
        } else {
            warn!(
                "failed to detach {} (exit {}): {}",
                mount_point.display(),
                result.exit_code,
                result.stderr
            );
        }
        state.forget(mount_point);
        Ok(())
    }

    /// Detach everything this manager attached. Failures are logged and
    /// swallowed.
    pub fn detach_all(&self) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                warn!("cannot detach volumes: {e}");
                return;
            }
        };
        let ours: Vec<PathBuf> = state
            .attached
            .iter()
            .filter(|mp| !state.is_pre_existing(mp))
            .cloned()
            .collect();
        for mp in ours {
            if let Err(e) = self.detach_locked(&mut state, &mp) {
                warn!("failed to detach {}: {e}", mp.display());
            }
        }
    }

    /// Snapshot of the mount points attached by this manager.
    pub fn attached(&self) -> Result<Vec<PathBuf>, RuntimeError> {
        Ok(self.lock()?.attached.clone())
    }
}

fn entities(dict: &Dictionary) -> impl Iterator<Item = &Dictionary> {
    dict.get("system-entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_dictionary)
}

fn mount_point(entity: &Dictionary) -> Option<PathBuf> {
    entity
        .get("mount-point")
        .and_then(Value::as_string)
        .map(PathBuf::from)
}

fn is_mountable(entity: &Dictionary) -> bool {
    let potentially = entity
        .get("potentially-mountable")
        .and_then(Value::as_boolean)
        .unwrap_or(false);
    let kind = entity.get("volume-kind").and_then(Value::as_string);
    potentially && kind.is_some_and(|k| MOUNTABLE_KINDS.contains(&k))
}

fn same_image(registered: &Path, image: &Path) -> bool {
    if normalize_lexically(registered) == normalize_lexically(image) {
        return true;
    }
    match same_contents(registered, image) {
        Ok(same) => same,
        Err(e) => {
            debug!(
                "cannot compare {} with {}: {e}",
                registered.display(),
                image.display()
            );
            false
        }
    }
}

/// Byte-for-byte comparison, streamed after a length check.
fn same_contents(a: &Path, b: &Path) -> io::Result<bool> {
    let (meta_a, meta_b) = (fs::metadata(a)?, fs::metadata(b)?);
    if !meta_a.is_file() || !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    let mut reader_a = BufReader::new(File::open(a)?);
    let mut reader_b = BufReader::new(File::open(b)?);
    loop {
        let chunk_a = reader_a.fill_buf()?;
        let chunk_b = reader_b.fill_buf()?;
        if chunk_a.is_empty() || chunk_b.is_empty() {
            return Ok(chunk_a.is_empty() && chunk_b.is_empty());
        }
        let n = chunk_a.len().min(chunk_b.len());
        if chunk_a[..n] != chunk_b[..n] {
            return Ok(false);
        }
        reader_a.consume(n);
        reader_b.consume(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;
    use crate::process::CommandResult;

    fn xml(value: Value) -> String {
        let mut buf = Vec::new();
        value.to_writer_xml(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn dict(pairs: Vec<(&str, Value)>) -> Value {
        Value::Dictionary(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect())
    }

    fn hfs_entity(mount: &Path) -> Value {
        dict(vec![
            ("potentially-mountable", Value::Boolean(true)),
            ("volume-kind", Value::String("hfs".into())),
            ("mount-point", Value::String(mount.to_string_lossy().into())),
        ])
    }

    fn registry(images: Vec<Value>) -> String {
        xml(dict(vec![("images", Value::Array(images))]))
    }

    fn no_license() -> String {
        xml(dict(vec![("Properties", dict(vec![]))]))
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        image: PathBuf,
        mount: PathBuf,
        mock: Arc<MockRunner>,
        volumes: VolumeManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("Foo.dmg");
        std::fs::write(&image, b"image bytes").unwrap();
        let mount = dir.path().join("dmg.ABC123");
        std::fs::create_dir(&mount).unwrap();

        let mock = Arc::new(MockRunner::new());
        mock.on(HDIUTIL, &["info"], CommandResult::ok(registry(vec![])))
            .on(HDIUTIL, &["imageinfo"], CommandResult::ok(no_license()))
            .on(HDIUTIL, &["detach"], CommandResult::ok(""));
        let volumes = VolumeManager::new(mock.clone());
        Fixture {
            _dir: dir,
            image,
            mount,
            mock,
            volumes,
        }
    }

    fn attach_output(entities: Vec<Value>) -> CommandResult {
        CommandResult::ok(xml(dict(vec![("system-entities", Value::Array(entities))])))
    }

    #[test]
    fn attach_keeps_only_mountable_volumes() {
        let fx = fixture();
        let partition = dict(vec![
            ("potentially-mountable", Value::Boolean(false)),
            ("content-hint", Value::String("GUID_partition_scheme".into())),
        ]);
        let fat = dict(vec![
            ("potentially-mountable", Value::Boolean(true)),
            ("volume-kind", Value::String("msdos".into())),
            ("mount-point", Value::String("/private/tmp/dmg.FAT".into())),
        ]);
        fx.mock.on(
            HDIUTIL,
            &["attach"],
            attach_output(vec![partition, hfs_entity(&fx.mount), fat]),
        );

        let mounts = fx.volumes.attach(&fx.image).unwrap();
        assert_eq!(mounts, vec![fx.mount.clone()]);
        assert_eq!(fx.volumes.attached().unwrap(), vec![fx.mount.clone()]);

        let attach = &fx.mock.calls_to(HDIUTIL, &["attach"])[0];
        assert_eq!(
            attach.args[2..],
            ["-mountrandom", "/private/tmp", "-plist", "-nobrowse"]
        );
        assert_eq!(attach.stdin, None);
    }

    #[test]
    fn detach_all_detaches_each_attached_volume_once() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["attach"], attach_output(vec![hfs_entity(&fx.mount)]));
        fx.volumes.attach(&fx.image).unwrap();

        fx.volumes.detach_all();
        fx.volumes.detach_all();

        let detaches = fx.mock.calls_to(HDIUTIL, &["detach"]);
        assert_eq!(detaches.len(), 1);
        assert_eq!(detaches[0].args[1], fx.mount.to_string_lossy());
        assert!(fx.volumes.attached().unwrap().is_empty());
    }

    #[test]
    fn already_mounted_image_is_reused_and_never_detached() {
        let fx = fixture();
        let entry = dict(vec![
            (
                "image-path",
                Value::String(fx.image.to_string_lossy().into()),
            ),
            ("system-entities", Value::Array(vec![hfs_entity(&fx.mount)])),
        ]);
        // Noise around the document, as hdiutil sometimes prints.
        let output = format!("warning: something\n{}\n", registry(vec![entry]));
        fx.mock.on(HDIUTIL, &["info"], CommandResult::ok(output));

        let mounts = fx.volumes.attach(&fx.image).unwrap();
        assert_eq!(mounts, vec![fx.mount.clone()]);
        assert!(fx.mock.calls_to(HDIUTIL, &["attach"]).is_empty());
        assert!(fx.volumes.attached().unwrap().is_empty());

        fx.volumes.detach(&fx.mount).unwrap();
        fx.volumes.detach_all();
        assert!(fx.mock.calls_to(HDIUTIL, &["detach"]).is_empty());
    }

    #[test]
    fn reattaching_our_own_image_keeps_it_ours() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["attach"], attach_output(vec![hfs_entity(&fx.mount)]));
        fx.volumes.attach(&fx.image).unwrap();

        // The system registry now lists the image we just attached.
        let entry = dict(vec![
            (
                "image-path",
                Value::String(fx.image.to_string_lossy().into()),
            ),
            ("system-entities", Value::Array(vec![hfs_entity(&fx.mount)])),
        ]);
        fx.mock
            .on(HDIUTIL, &["info"], CommandResult::ok(registry(vec![entry])));
        let mounts = fx.volumes.attach(&fx.image).unwrap();
        assert_eq!(mounts, vec![fx.mount.clone()]);
        assert_eq!(fx.mock.calls_to(HDIUTIL, &["attach"]).len(), 1);

        fx.volumes.detach_all();
        assert_eq!(fx.mock.calls_to(HDIUTIL, &["detach"]).len(), 1);
        assert!(fx.volumes.attached().unwrap().is_empty());
    }

    #[test]
    fn existing_mount_matched_by_identical_content() {
        let fx = fixture();
        let copy = fx.image.with_file_name("Copy of Foo.dmg");
        std::fs::write(&copy, b"image bytes").unwrap();
        let entry = dict(vec![
            ("image-path", Value::String(copy.to_string_lossy().into())),
            ("system-entities", Value::Array(vec![hfs_entity(&fx.mount)])),
        ]);
        fx.mock
            .on(HDIUTIL, &["info"], CommandResult::ok(registry(vec![entry])));

        let found = fx.volumes.existing_mount_points(&fx.image).unwrap();
        assert_eq!(found, Some(vec![fx.mount.clone()]));
    }

    #[test]
    fn different_image_is_not_a_match() {
        let fx = fixture();
        let other = fx.image.with_file_name("Other.dmg");
        std::fs::write(&other, b"other bytes").unwrap();
        let entry = dict(vec![
            ("image-path", Value::String(other.to_string_lossy().into())),
            ("system-entities", Value::Array(vec![hfs_entity(&fx.mount)])),
        ]);
        fx.mock
            .on(HDIUTIL, &["info"], CommandResult::ok(registry(vec![entry])));

        assert_eq!(fx.volumes.existing_mount_points(&fx.image).unwrap(), None);
    }

    #[test]
    fn registry_without_images_key_is_none() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["info"], CommandResult::ok(xml(dict(vec![]))));
        assert_eq!(fx.volumes.existing_mount_points(&fx.image).unwrap(), None);
    }

    #[test]
    fn license_agreement_is_accepted_on_stdin() {
        let fx = fixture();
        let sla = xml(dict(vec![(
            "Properties",
            dict(vec![("Software License Agreement", Value::Boolean(true))]),
        )]));
        fx.mock
            .on(HDIUTIL, &["imageinfo"], CommandResult::ok(sla))
            .on(HDIUTIL, &["attach"], attach_output(vec![hfs_entity(&fx.mount)]));

        assert!(fx.volumes.has_license_agreement(&fx.image).unwrap());
        fx.volumes.attach(&fx.image).unwrap();

        let attach = &fx.mock.calls_to(HDIUTIL, &["attach"])[0];
        assert_eq!(attach.stdin.as_deref(), Some("Y\n"));
    }

    #[test]
    fn failed_attach_is_mount_error() {
        let fx = fixture();
        fx.mock.on(
            HDIUTIL,
            &["attach"],
            CommandResult::failed(1, "hdiutil: attach failed - no mountable file systems"),
        );
        let err = fx.volumes.attach(&fx.image).unwrap_err();
        match err {
            RuntimeError::MountFailed(msg) => assert!(msg.contains("no mountable file systems")),
            other => panic!("unexpected error: {other}"),
        }
        assert!(fx.volumes.attached().unwrap().is_empty());
    }

    #[test]
    fn attach_output_without_document_is_an_error() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["attach"], CommandResult::ok("/dev/disk4 GUID"));
        let err = fx.volumes.attach(&fx.image).unwrap_err();
        assert!(matches!(err, RuntimeError::Document(_)));
    }

    #[test]
    fn vanished_mount_point_is_forgotten_without_running_detach() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["attach"], attach_output(vec![hfs_entity(&fx.mount)]));
        fx.volumes.attach(&fx.image).unwrap();
        std::fs::remove_dir(&fx.mount).unwrap();

        fx.volumes.detach(&fx.mount).unwrap();
        assert!(fx.mock.calls_to(HDIUTIL, &["detach"]).is_empty());
        assert!(fx.volumes.attached().unwrap().is_empty());
    }

    #[test]
    fn failing_detach_is_only_a_warning() {
        let fx = fixture();
        fx.mock
            .on(HDIUTIL, &["attach"], attach_output(vec![hfs_entity(&fx.mount)]))
            .on(
                HDIUTIL,
                &["detach"],
                CommandResult::failed(16, "hdiutil: couldn't unmount - Resource busy"),
            );
        fx.volumes.attach(&fx.image).unwrap();

        fx.volumes.detach(&fx.mount).unwrap();
        assert_eq!(fx.mock.calls_to(HDIUTIL, &["detach"]).len(), 1);
        assert!(fx.volumes.attached().unwrap().is_empty());
    }

    #[test]
    fn content_comparison_checks_every_byte() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, vec![7u8; 100_000]).unwrap();
        let mut data = vec![7u8; 100_000];
        std::fs::write(&b, &data).unwrap();
        assert!(same_contents(&a, &b).unwrap());

        data[99_999] = 8;
        std::fs::write(&b, &data).unwrap();
        assert!(!same_contents(&a, &b).unwrap());
    }
}
