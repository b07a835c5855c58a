//! `credvault generate` — print a random password.

use crate::errors::Result;
use crate::generator;
use crate::vault::PasswordStrength;

/// Execute the `generate` command.  Prints only the password so the output
/// can be piped.
pub fn execute(strength: PasswordStrength) -> Result<()> {
    println!("{}", generator::generate(strength));
    Ok(())
}
