//! Locating the Sense HAT device nodes.
//!
//! The framebuffer and joystick are matched by the name the kernel driver
//! reports in sysfs, since their numbering depends on probe order.

use std::path::{Path, PathBuf};

use tracing::debug;

pub const FRAMEBUFFER_NAME: &str = "RPi-Sense FB";
pub const JOYSTICK_NAME: &str = "Raspberry Pi Sense HAT Joystick";

pub const SYSFS_ROOT: &str = "/sys/class";
pub const DEV_ROOT: &str = "/dev";

/// Finds `/dev/fbN` whose `graphics/fbN/name` is the Sense HAT framebuffer.
pub fn find_framebuffer(sysfs_root: &Path, dev_root: &Path) -> Option<PathBuf> {
    find_device(
        &sysfs_root.join("graphics"),
        "fb",
        Path::new("name"),
        FRAMEBUFFER_NAME,
    )
    .map(|node| dev_root.join(node))
}

/// Finds `/dev/input/eventN` whose `input/eventN/device/name` is the joystick.
pub fn find_joystick(sysfs_root: &Path, dev_root: &Path) -> Option<PathBuf> {
    find_device(
        &sysfs_root.join("input"),
        "event",
        Path::new("device/name"),
        JOYSTICK_NAME,
    )
    .map(|node| dev_root.join("input").join(node))
}

fn find_device(class_dir: &Path, prefix: &str, name_file: &Path, wanted: &str) -> Option<String> {
    let entries = match std::fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot scan {}: {}", class_dir.display(), e);
            return None;
        }
    };

    let mut nodes: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|node| node.starts_with(prefix))
        .collect();
    nodes.sort();

    nodes.into_iter().find(|node| {
        let name_path = class_dir.join(node).join(name_file);
        match std::fs::read_to_string(&name_path) {
            Ok(name) => {
                debug!("{} is {:?}", node, name.trim());
                name.trim() == wanted
            }
            Err(_) => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSysfs {
        root: PathBuf,
    }

    impl FakeSysfs {
        fn new(name: &str) -> Self {
            let root = std::env::temp_dir().join(format!(
                "sensebridge-sysfs-{}-{}",
                name,
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&root);
            std::fs::create_dir_all(&root).unwrap();
            Self { root }
        }

        fn add(&self, relative: &str, content: &str) {
            let path = self.root.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
    }

    impl Drop for FakeSysfs {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn finds_sense_hat_framebuffer() {
        let sysfs = FakeSysfs::new("fb");
        sysfs.add("graphics/fb0/name", "BCM2708 FB\n");
        sysfs.add("graphics/fb1/name", "RPi-Sense FB\n");
        sysfs.add("graphics/fbcon/name", "RPi-Sense FB\n");

        assert_eq!(
            find_framebuffer(&sysfs.root, Path::new("/dev")),
            Some(PathBuf::from("/dev/fb1"))
        );
    }

    #[test]
    fn finds_joystick_event_device() {
        let sysfs = FakeSysfs::new("input");
        sysfs.add("input/event0/device/name", "vc4-hdmi\n");
        sysfs.add("input/event2/device/name", "Raspberry Pi Sense HAT Joystick\n");
        sysfs.add("input/mice/device/name", "Raspberry Pi Sense HAT Joystick\n");

        assert_eq!(
            find_joystick(&sysfs.root, Path::new("/dev")),
            Some(PathBuf::from("/dev/input/event2"))
        );
    }

    #[test]
    fn missing_devices_are_none() {
        let sysfs = FakeSysfs::new("empty");
        sysfs.add("graphics/fb0/name", "BCM2708 FB\n");

        assert_eq!(find_framebuffer(&sysfs.root, Path::new("/dev")), None);
        assert_eq!(find_joystick(&sysfs.root, Path::new("/dev")), None);
    }
}
