//! Where the vault password comes from
//!
//! The CLI picks one source per run: the positional argument, piped stdin
//! (`--password-stdin`) or a no-echo terminal prompt. Every source hands the
//! password out as raw bytes in a `Zeroizing` buffer.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

pub trait PasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Password given on the command line.
pub struct ArgumentPasswordReader {
    password: Zeroizing<Vec<u8>>,
}

impl ArgumentPasswordReader {
    pub fn new(password: impl Into<Vec<u8>>) -> Self {
        Self {
            password: Zeroizing::new(password.into()),
        }
    }
}

impl PasswordReader for ArgumentPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(self.password.clone())
    }
}

/// Password piped in on stdin (or any other reader in tests).
///
/// Input is taken verbatim up to end of file, so a trailing newline is part
/// of the password. Empty input is refused.
pub struct StdinPasswordReader<R = io::Stdin> {
    input: R,
}

impl StdinPasswordReader {
    pub fn stdin() -> Self {
        Self { input: io::stdin() }
    }
}

impl<R: Read> StdinPasswordReader<R> {
    pub fn from_reader(input: R) -> Self {
        Self { input }
    }
}

impl<R: Read> PasswordReader for StdinPasswordReader<R> {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut password = Zeroizing::new(Vec::new());
        self.input.read_to_end(&mut password).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to read password from stdin",
                e,
            )
        })?;
        if password.is_empty() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "no password on stdin",
            ));
        }
        Ok(password)
    }
}

/// Reads the password from the terminal with no echo.
///
/// With `confirm` set the password is asked for twice and both entries must
/// match; used when creating a vault, where a typo would make the folder
/// unrecoverable.
pub struct TerminalPasswordReader {
    confirm: bool,
}

impl TerminalPasswordReader {
    pub fn new(confirm: bool) -> Self {
        Self { confirm }
    }

    fn prompt(label: &str) -> Result<Zeroizing<Vec<u8>>> {
        io::stderr()
            .write_all(label.as_bytes())
            .and_then(|()| io::stderr().flush())
            .map_err(|e| {
                VaultError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to write prompt: {}", e),
                    e,
                )
            })?;

        // rpassword only yields UTF-8 and its String is not zeroized.
        let password = rpassword::read_password().map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;
        Ok(Zeroizing::new(password.into_bytes()))
    }
}

impl PasswordReader for TerminalPasswordReader {
    /// Non-UTF-8 passwords need --password-stdin.
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "stdin is not a terminal; give the password as an argument or use --password-stdin",
            ));
        }

        let password = Self::prompt("Password (foldervault): ")?;
        if self.confirm {
            let again = Self::prompt("Confirm password (foldervault): ")?;
            if *again != *password {
                return Err(VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PasswordUnavailable,
                    "passwords do not match",
                ));
            }
        }
        Ok(password)
    }
}
