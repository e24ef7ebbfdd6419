//! Listing entries and their text rendering.
//!
//! A listing is the extraction pass with the host swapped out, so entries
//! carry exactly what a header chunk declares. The long format mirrors an
//! `ls -l` line: type character, permission string with setuid/setgid/sticky
//! overlays, a size column that holds device numbers for block and character
//! nodes, the modification date, and the path. Hardlinks display their
//! target's timestamp and a fixed permission mask, since their own header
//! carries neither.
//!
//! Dates render in UTC; a listing must not change with the host timezone.

use serde::Serialize;
use yex_ondisk::{ObjectHeader, ObjectType};
use yex_types::{S_IFBLK, S_IFCHR, S_IFIFO, S_IFMT, S_IFSOCK, PERM_MODE_MASK};

/// One image entry, in image order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub path: String,
    pub object_type: ObjectType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// For hardlinks, the target's timestamp, or 0 when the target is
    /// unknown.
    pub mtime: u32,
    pub rdev: u32,
    /// Symlink alias, or the destination-relative path a hardlink points at.
    pub link_target: Option<String>,
}

impl ListEntry {
    pub(crate) fn node(path: &str, header: &ObjectHeader) -> Self {
        Self {
            path: path.to_owned(),
            object_type: header.object_type,
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            size: if header.object_type == ObjectType::File {
                header.file_size
            } else {
                0
            },
            mtime: header.mtime,
            rdev: header.rdev,
            link_target: if header.object_type == ObjectType::Symlink {
                Some(header.alias.clone())
            } else {
                None
            },
        }
    }

    pub(crate) fn hardlink(
        path: &str,
        header: &ObjectHeader,
        target: Option<(String, u32)>,
    ) -> Self {
        let (link_target, mtime) = match target {
            Some((target_path, target_mtime)) => (Some(target_path), target_mtime),
            None => (None, 0),
        };
        Self {
            path: path.to_owned(),
            object_type: ObjectType::Hardlink,
            mode: header.mode,
            uid: header.uid,
            gid: header.gid,
            size: 0,
            mtime,
            rdev: header.rdev,
            link_target,
        }
    }

    /// Render the long listing line for this entry.
    #[must_use]
    pub fn long_line(&self) -> String {
        // A hardlink's header mode is meaningless; show it wide open like
        // the node it aliases could be.
        let shown_mode = if self.object_type == ObjectType::Hardlink {
            PERM_MODE_MASK
        } else {
            self.mode
        };

        let size_column = match (self.object_type, self.mode & S_IFMT) {
            (ObjectType::File, _) => self.size.to_string(),
            (ObjectType::Special, S_IFBLK | S_IFCHR) => {
                format!("{},{:4}", dev_major(self.rdev), dev_minor(self.rdev))
            }
            _ => "0".to_owned(),
        };

        let (year, month, day, hour, minute) = civil_from_epoch(self.mtime);
        let mut line = format!(
            "{}{} {:>8} {:04}-{:02}-{:02} {:02}:{:02} {}",
            self.type_char(),
            perm_string(shown_mode),
            size_column,
            year,
            month,
            day,
            hour,
            minute,
            self.path,
        );

        match self.object_type {
            ObjectType::Hardlink => match &self.link_target {
                Some(target) => {
                    line.push_str(" -> /");
                    line.push_str(target);
                }
                None => line.push_str(" -> !!! Invalid !!!"),
            },
            ObjectType::Symlink => {
                if let Some(target) = &self.link_target {
                    line.push_str(" -> ");
                    line.push_str(target);
                }
            }
            _ => {}
        }
        line
    }

    fn type_char(&self) -> char {
        match self.object_type {
            ObjectType::File => '-',
            ObjectType::Directory => 'd',
            ObjectType::Symlink => 'l',
            ObjectType::Hardlink => 'h',
            ObjectType::Special => match self.mode & S_IFMT {
                S_IFBLK => 'b',
                S_IFCHR => 'c',
                S_IFIFO => 'p',
                S_IFSOCK => 's',
                _ => '?',
            },
            ObjectType::Unknown => '?',
        }
    }
}

fn perm_string(mode: u32) -> String {
    let mut perm = ['-'; 9];
    for group in 0..3 {
        let bits = mode >> (6 - 3 * group);
        if bits & 0o4 != 0 {
            perm[3 * group] = 'r';
        }
        if bits & 0o2 != 0 {
            perm[3 * group + 1] = 'w';
        }
        if bits & 0o1 != 0 {
            perm[3 * group + 2] = 'x';
        }
    }
    if mode & 0o4000 != 0 {
        perm[2] = if perm[2] == '-' { 'S' } else { 's' };
    }
    if mode & 0o2000 != 0 {
        perm[5] = if perm[5] == '-' { 'S' } else { 's' };
    }
    if mode & 0o1000 != 0 {
        perm[8] = if perm[8] == '-' { 'T' } else { 't' };
    }
    perm.iter().collect()
}

/// Device number split used by images produced on Linux.
fn dev_major(rdev: u32) -> u32 {
    (rdev >> 8) & 0xFFF
}

fn dev_minor(rdev: u32) -> u32 {
    (rdev & 0xFF) | ((rdev >> 12) & 0xFFF00)
}

/// Break a Unix timestamp into UTC calendar fields, days-from-epoch style.
fn civil_from_epoch(secs: u32) -> (i64, u32, u32, u32, u32) {
    let secs = i64::from(secs);
    let days = secs.div_euclid(86_400);
    let rem = secs.rem_euclid(86_400);
    let hour = (rem / 3_600) as u32;
    let minute = (rem % 3_600 / 60) as u32;

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1_460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let mp = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);

    (year, month, day, hour, minute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yex_types::ObjectId;

    fn header(object_type: ObjectType, mode: u32) -> ObjectHeader {
        ObjectHeader {
            object_type,
            parent_id: ObjectId(1),
            name: String::new(),
            mode,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            file_size: 0,
            equivalent_id: ObjectId(0),
            alias: String::new(),
            rdev: 0,
        }
    }

    #[test]
    fn permission_strings_with_overlays() {
        assert_eq!(perm_string(0o755), "rwxr-xr-x");
        assert_eq!(perm_string(0o640), "rw-r-----");
        assert_eq!(perm_string(0o4755), "rwsr-xr-x");
        assert_eq!(perm_string(0o4644), "rwSr--r--");
        assert_eq!(perm_string(0o2715), "rwx--sr-x");
        assert_eq!(perm_string(0o1777), "rwxrwxrwt");
        assert_eq!(perm_string(0o1666), "rw-rw-rwT");
        assert_eq!(perm_string(0), "---------");
    }

    #[test]
    fn utc_calendar_conversion() {
        assert_eq!(civil_from_epoch(0), (1970, 1, 1, 0, 0));
        assert_eq!(civil_from_epoch(86_399), (1970, 1, 1, 23, 59));
        assert_eq!(civil_from_epoch(951_782_400), (2000, 2, 29, 0, 0));
        assert_eq!(civil_from_epoch(1_600_000_000), (2020, 9, 13, 12, 26));
        assert_eq!(civil_from_epoch(u32::MAX), (2106, 2, 7, 6, 28));
    }

    #[test]
    fn file_line_shows_size_and_date() {
        let mut h = header(ObjectType::File, 0o100_644);
        h.file_size = 1234;
        h.mtime = 1_600_000_000;
        let entry = ListEntry::node("etc/passwd", &h);
        assert_eq!(
            entry.long_line(),
            "-rw-r--r--     1234 2020-09-13 12:26 etc/passwd"
        );
    }

    #[test]
    fn symlink_line_appends_the_alias() {
        let mut h = header(ObjectType::Symlink, 0o120_777);
        h.alias = "/proc/mounts".to_owned();
        let entry = ListEntry::node("etc/mtab", &h);
        assert_eq!(
            entry.long_line(),
            "lrwxrwxrwx        0 1970-01-01 00:00 etc/mtab -> /proc/mounts"
        );
    }

    #[test]
    fn hardlink_lines_borrow_the_target_timestamp() {
        let h = header(ObjectType::Hardlink, 0o100_600);
        let entry = ListEntry::hardlink("bin/sh", &h, Some(("bin/busybox".to_owned(), 60)));
        assert_eq!(
            entry.long_line(),
            "hrwxrwxrwx        0 1970-01-01 00:01 bin/sh -> /bin/busybox"
        );

        let entry = ListEntry::hardlink("bin/lost", &h, None);
        assert_eq!(
            entry.long_line(),
            "hrwxrwxrwx        0 1970-01-01 00:00 bin/lost -> !!! Invalid !!!"
        );
    }

    #[test]
    fn device_lines_show_major_and_minor() {
        let mut h = header(ObjectType::Special, 0o020_666);
        h.rdev = 0x0103;
        let entry = ListEntry::node("dev/null", &h);
        assert_eq!(
            entry.long_line(),
            "crw-rw-rw-   1,   3 1970-01-01 00:00 dev/null"
        );

        let mut h = header(ObjectType::Special, 0o060_660);
        h.rdev = 0xB302;
        let entry = ListEntry::node("dev/mmcblk0p2", &h);
        assert!(entry.long_line().starts_with("brw-rw----"));
        assert!(entry.long_line().contains("179,   2"));
    }

    #[test]
    fn fifo_socket_and_unknown_type_chars() {
        let entry = ListEntry::node("run/pipe", &header(ObjectType::Special, 0o010_644));
        assert!(entry.long_line().starts_with('p'));

        let entry = ListEntry::node("run/sock", &header(ObjectType::Special, 0o140_755));
        assert!(entry.long_line().starts_with('s'));

        let entry = ListEntry::node("odd", &header(ObjectType::Special, 0o644));
        assert!(entry.long_line().starts_with('?'));

        let entry = ListEntry::node("mystery", &header(ObjectType::Unknown, 0o755));
        assert!(entry.long_line().starts_with('?'));
    }
}
