use mk_sessions::Secret;

/// Print a fresh random secret.
///
/// The value goes to stdout alone so it can be piped straight into a
/// secret manager; hints go to stderr.
pub fn generate(secret_env: &str) {
    let secret = Secret::generate();
    println!("{secret}");
    eprintln!("export it as {secret_env} on every instance sharing the identity store");
}
