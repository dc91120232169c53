//! Security principals as validated SID byte strings.
//!
//! The binary layout is the classic SID encoding: revision byte, sub-authority
//! count, 48-bit big-endian identifier authority, then little-endian 32-bit
//! sub-authorities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::spec::DirSecurityError;

const N_SID_REVISION: u8 = 1;
const N_SID_HEADER_LEN: usize = 8;
const N_SID_MAX_SUB_AUTHORITIES: usize = 15;

const N_AUTHORITY_NULL: u64 = 0;
const N_AUTHORITY_WORLD: u64 = 1;
/// Samba's "Unix Users"/"Unix Groups" authority.
const N_AUTHORITY_UNIX: u64 = 22;

/// Opaque identity token. Equality is byte-wise.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal {
    raw: Box<[u8]>,
}

impl Principal {
    /// Validate and wrap raw identifier bytes.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, DirSecurityError> {
        if raw.len() < N_SID_HEADER_LEN {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Principal identifier too short: {} byte(s)",
                raw.len()
            )));
        }
        if raw[0] != N_SID_REVISION {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Unsupported principal identifier revision: {}",
                raw[0]
            )));
        }
        let n_sub = usize::from(raw[1]);
        if n_sub > N_SID_MAX_SUB_AUTHORITIES {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Principal identifier has too many sub-authorities: {n_sub}"
            )));
        }
        let n_expected = N_SID_HEADER_LEN + 4 * n_sub;
        if raw.len() != n_expected {
            return Err(DirSecurityError::InvalidArgument(format!(
                "Principal identifier length {} does not match {n_sub} sub-authorities",
                raw.len()
            )));
        }
        Ok(Self { raw: raw.into() })
    }

    fn from_parts(authority: u64, l_sub_authorities: &[u32]) -> Self {
        let mut raw = Vec::with_capacity(N_SID_HEADER_LEN + 4 * l_sub_authorities.len());
        raw.push(N_SID_REVISION);
        // Callers stay within the sub-authority limit.
        raw.push(l_sub_authorities.len() as u8);
        raw.extend_from_slice(&authority.to_be_bytes()[2..]);
        for sub in l_sub_authorities {
            raw.extend_from_slice(&sub.to_le_bytes());
        }
        Self { raw: raw.into() }
    }

    /// `S-1-22-1-<uid>`.
    pub fn from_unix_uid(uid: u32) -> Self {
        Self::from_parts(N_AUTHORITY_UNIX, &[1, uid])
    }

    /// `S-1-22-2-<gid>`.
    pub fn from_unix_gid(gid: u32) -> Self {
        Self::from_parts(N_AUTHORITY_UNIX, &[2, gid])
    }

    /// `S-1-1-0`.
    pub fn everyone() -> Self {
        Self::from_parts(N_AUTHORITY_WORLD, &[0])
    }

    /// `S-1-0-0`, used when an object has no resolvable owner.
    pub fn nobody() -> Self {
        Self::from_parts(N_AUTHORITY_NULL, &[0])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn identifier_authority(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf[2..].copy_from_slice(&self.raw[2..N_SID_HEADER_LEN]);
        u64::from_be_bytes(buf)
    }

    pub fn sub_authorities(&self) -> impl Iterator<Item = u32> + '_ {
        self.raw[N_SID_HEADER_LEN..]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let authority = self.identifier_authority();
        if authority >= 1 << 32 {
            write!(f, "S-{}-0x{authority:012X}", self.raw[0])?;
        } else {
            write!(f, "S-{}-{authority}", self.raw[0])?;
        }
        for sub in self.sub_authorities() {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Principal({self})")
    }
}

impl FromStr for Principal {
    type Err = DirSecurityError;

    fn from_str(txt: &str) -> Result<Self, Self::Err> {
        let invalid =
            || DirSecurityError::InvalidArgument(format!("Malformed principal string: {txt:?}"));

        let mut iter_parts = txt.split('-');
        if !iter_parts
            .next()
            .is_some_and(|p| p.eq_ignore_ascii_case("S"))
        {
            return Err(invalid());
        }
        let revision: u8 = iter_parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        if revision != N_SID_REVISION {
            return Err(invalid());
        }
        let c_authority = iter_parts.next().ok_or_else(invalid)?;
        let authority = match c_authority
            .strip_prefix("0x")
            .or_else(|| c_authority.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid())?,
            None => c_authority.parse::<u64>().map_err(|_| invalid())?,
        };
        if authority >= 1 << 48 {
            return Err(invalid());
        }
        let l_sub_authorities = iter_parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        if l_sub_authorities.len() > N_SID_MAX_SUB_AUTHORITIES {
            return Err(invalid());
        }
        Ok(Self::from_parts(authority, &l_sub_authorities))
    }
}

impl TryFrom<String> for Principal {
    type Error = DirSecurityError;

    fn try_from(txt: String) -> Result<Self, Self::Error> {
        txt.parse()
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.to_string()
    }
}

/// Identity-directory collaborator: resolves an entry handle to its
/// identifier bytes.
pub trait PrincipalSource {
    /// Opaque handle to a directory entry (user, group, service account).
    type Entry;

    fn principal_bytes(&self, entry: &Self::Entry) -> Result<Vec<u8>, DirSecurityError>;
}

/// Resolve `entry` through `source`, validating the returned bytes.
pub fn resolve_principal<S: PrincipalSource>(
    source: &S,
    entry: &S::Entry,
) -> Result<Principal, DirSecurityError> {
    let raw = source.principal_bytes(entry)?;
    Principal::from_bytes(&raw)
}
