//! Member policy validation.
//!
//! Every archive member passes through [`evaluate_member`] before any byte of
//! it touches disk. The validator is a pure function over plain data — the
//! extractor converts whatever its tar library yields into an
//! [`ArchiveMember`], so the policy itself never depends on library records
//! and can be tested exhaustively without touching an archive.

/// Closed classification of one entry read from an untrusted archive stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Regular,
    Directory,
    Symlink,
    Hardlink,
    CharDevice,
    BlockDevice,
    Fifo,
    /// pax extended header attached to the following entry
    ExtendedHeader,
    /// pax global extended header
    GlobalExtendedHeader,
    /// GNU sparse regular-file variant
    Sparse,
    Unknown,
}

/// One archive member as seen by the policy: raw untrusted metadata only.
#[derive(Clone, Debug)]
pub struct ArchiveMember {
    /// Raw path string exactly as declared in the archive.
    pub name: String,
    pub kind: MemberKind,
    /// Declared size in bytes; untrusted until the stream is actually read.
    pub size: u64,
    /// Declared permission bits.
    pub mode: u32,
    /// Declared modification time (epoch seconds).
    pub mtime: Option<u64>,
}

/// Configuration governing one restore. Immutable for the invocation.
#[derive(Clone, Debug)]
pub struct RestorePolicy {
    /// Cap on accepted regular files.
    pub max_files: Option<u64>,
    /// Cap on cumulative declared bytes.
    pub max_bytes: Option<u64>,
    /// Permit pax/extended headers (skipped, never written to disk).
    pub allow_extended_headers: bool,
    /// Reject sparse members outright with a dedicated reason. Even when
    /// disabled, sparse layouts stay unsupported and fall through to the
    /// generic rejection — the plain byte-copy path cannot honor them.
    pub reject_sparse: bool,
    /// Validate everything, write nothing.
    pub dry_run: bool,
}

impl Default for RestorePolicy {
    fn default() -> Self {
        Self {
            max_files: None,
            max_bytes: None,
            allow_extended_headers: false,
            reject_sparse: true,
            dry_run: false,
        }
    }
}

/// Rejection reasons surfaced inside `RestoreError::PolicyViolation`.
pub const REASON_LINK: &str = "symlink/hardlink member disallowed";
pub const REASON_DEVICE: &str = "special device/fifo member disallowed";
pub const REASON_SPARSE: &str = "sparse/gnu-special member rejected";
pub const REASON_UNSAFE_PATH: &str = "member has unsafe path";
pub const REASON_UNSUPPORTED: &str = "unsupported or disallowed member type";

/// What the extractor should do with one member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberVerdict {
    /// Write a regular file at this sanitized relative path.
    WriteFile { path: String },
    /// Create a directory at this sanitized relative path.
    MakeDir { path: String },
    /// Metadata-only member; consume without writing anything.
    Skip,
    /// Abort the restore; nothing past this member is written.
    Reject { reason: &'static str },
}

/// Normalize an untrusted member name into a destination-relative path.
///
/// `.` segments and backslash separators are collapsed, `..` segments resolve
/// against earlier components, and a leading separator is stripped — an
/// absolute name is deliberately treated as relative rather than rejected
/// (permissive, covered by tests as intentional). Returns `None` when the
/// name is empty or any `..` would climb above the destination root; the
/// empty string is returned for names that reduce to the root itself.
pub fn sanitize_member_name(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let unified = raw.replace('\\', "/");
    let trimmed = unified.trim_start_matches('/');

    let mut parts: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return None;
                }
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Classify one member against the policy. First match wins.
pub fn evaluate_member(member: &ArchiveMember, policy: &RestorePolicy) -> MemberVerdict {
    use MemberKind::*;

    match member.kind {
        Symlink | Hardlink => MemberVerdict::Reject {
            reason: REASON_LINK,
        },
        CharDevice | BlockDevice | Fifo => MemberVerdict::Reject {
            reason: REASON_DEVICE,
        },
        Sparse if policy.reject_sparse => MemberVerdict::Reject {
            reason: REASON_SPARSE,
        },
        ExtendedHeader | GlobalExtendedHeader if policy.allow_extended_headers => {
            MemberVerdict::Skip
        }
        Directory => match sanitize_member_name(&member.name) {
            None => MemberVerdict::Reject {
                reason: REASON_UNSAFE_PATH,
            },
            // the destination root itself; nothing to create
            Some(path) if path.is_empty() => MemberVerdict::Skip,
            Some(path) => MemberVerdict::MakeDir { path },
        },
        Regular => match sanitize_member_name(&member.name) {
            None => MemberVerdict::Reject {
                reason: REASON_UNSAFE_PATH,
            },
            Some(path) if path.is_empty() => MemberVerdict::Reject {
                reason: REASON_UNSAFE_PATH,
            },
            Some(path) => MemberVerdict::WriteFile { path },
        },
        // disallowed pax headers, sparse-with-rejection-disabled, and anything
        // the classifier could not name
        _ => MemberVerdict::Reject {
            reason: REASON_UNSUPPORTED,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, kind: MemberKind) -> ArchiveMember {
        ArchiveMember {
            name: name.to_string(),
            kind,
            size: 0,
            mode: 0o644,
            mtime: None,
        }
    }

    #[test]
    fn sanitize_safe_paths() {
        let cases = [
            ("foo/bar.txt", "foo/bar.txt"),
            ("./foo", "foo"),
            // collapses but never starts with ..
            ("dir/../safe", "safe"),
            ("dir/", "dir"),
            (".", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(sanitize_member_name(input).as_deref(), Some(expected), "{input}");
        }
    }

    #[test]
    fn sanitize_unsafe_paths() {
        for input in ["../traversal", "..", "../../etc/passwd", "/../foo", ""] {
            assert_eq!(sanitize_member_name(input), None, "{input}");
        }
    }

    #[test]
    fn sanitize_strips_leading_separator() {
        // permissive by design: absolute names are treated as relative
        assert_eq!(sanitize_member_name("/absolute").as_deref(), Some("absolute"));
        assert_eq!(
            sanitize_member_name("/etc/passwd").as_deref(),
            Some("etc/passwd")
        );
    }

    #[test]
    fn sanitize_handles_backslashes() {
        assert_eq!(
            sanitize_member_name("dir\\sub\\file").as_deref(),
            Some("dir/sub/file")
        );
        assert_eq!(sanitize_member_name("..\\evil"), None);
    }

    #[test]
    fn links_rejected_unconditionally() {
        let policy = RestorePolicy::default();
        for kind in [MemberKind::Symlink, MemberKind::Hardlink] {
            let verdict = evaluate_member(&member("link", kind), &policy);
            assert_eq!(
                verdict,
                MemberVerdict::Reject {
                    reason: REASON_LINK
                }
            );
        }
    }

    #[test]
    fn devices_and_fifos_rejected() {
        let policy = RestorePolicy::default();
        for kind in [
            MemberKind::CharDevice,
            MemberKind::BlockDevice,
            MemberKind::Fifo,
        ] {
            let verdict = evaluate_member(&member("dev", kind), &policy);
            assert_eq!(
                verdict,
                MemberVerdict::Reject {
                    reason: REASON_DEVICE
                }
            );
        }
    }

    #[test]
    fn sparse_rejected_by_default() {
        let verdict = evaluate_member(
            &member("sparse", MemberKind::Sparse),
            &RestorePolicy::default(),
        );
        assert_eq!(
            verdict,
            MemberVerdict::Reject {
                reason: REASON_SPARSE
            }
        );
    }

    #[test]
    fn sparse_still_unsupported_when_allowed() {
        let policy = RestorePolicy {
            reject_sparse: false,
            ..RestorePolicy::default()
        };
        let verdict = evaluate_member(&member("sparse", MemberKind::Sparse), &policy);
        assert_eq!(
            verdict,
            MemberVerdict::Reject {
                reason: REASON_UNSUPPORTED
            }
        );
    }

    #[test]
    fn pax_headers_skipped_only_when_allowed() {
        let allow = RestorePolicy {
            allow_extended_headers: true,
            ..RestorePolicy::default()
        };
        let deny = RestorePolicy::default();
        for kind in [MemberKind::ExtendedHeader, MemberKind::GlobalExtendedHeader] {
            assert_eq!(
                evaluate_member(&member("pax", kind), &allow),
                MemberVerdict::Skip
            );
            assert_eq!(
                evaluate_member(&member("pax", kind), &deny),
                MemberVerdict::Reject {
                    reason: REASON_UNSUPPORTED
                }
            );
        }
    }

    #[test]
    fn traversal_file_rejected() {
        let verdict = evaluate_member(
            &member("../etc/passwd", MemberKind::Regular),
            &RestorePolicy::default(),
        );
        assert_eq!(
            verdict,
            MemberVerdict::Reject {
                reason: REASON_UNSAFE_PATH
            }
        );
    }

    #[test]
    fn root_directory_entry_is_skipped() {
        let verdict = evaluate_member(
            &member("./", MemberKind::Directory),
            &RestorePolicy::default(),
        );
        assert_eq!(verdict, MemberVerdict::Skip);
    }

    #[test]
    fn regular_and_directory_accepted() {
        let policy = RestorePolicy::default();
        assert_eq!(
            evaluate_member(&member("d/f.txt", MemberKind::Regular), &policy),
            MemberVerdict::WriteFile {
                path: "d/f.txt".into()
            }
        );
        assert_eq!(
            evaluate_member(&member("d/", MemberKind::Directory), &policy),
            MemberVerdict::MakeDir { path: "d".into() }
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        let verdict = evaluate_member(
            &member("mystery", MemberKind::Unknown),
            &RestorePolicy::default(),
        );
        assert_eq!(
            verdict,
            MemberVerdict::Reject {
                reason: REASON_UNSUPPORTED
            }
        );
    }
}
