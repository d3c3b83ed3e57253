/// Prints an Argon2 PHC string for `[[identity.users]]` entries.
///
/// $ cargo run --bin hash_password -- 'correct horse battery staple'
use tokenvault::application_impl::Argon2PasswordHasher;
use tokenvault::settings::Parser;

#[derive(Parser, Debug)]
struct Args {
    password: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let hash = Argon2PasswordHasher::hash_password(&args.password)?;
    println!("{}", hash);
    Ok(())
}
