#![warn(clippy::all, clippy::pedantic)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use conceal_stream::{crypto, AesCbcEngine, CipherReader, KeySize, CHUNK_SIZE};
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::exit;

/// Encrypt and decrypt streams with AES-CBC.
///
/// Set RUST_LOG=debug to see what the cipher stream is doing.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    operation: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file (or stdin)
    Encrypt(StreamArgs),

    /// Decrypt a file (or stdin). Nothing is written unless the whole input checks out
    Decrypt(StreamArgs),

    /// Print a random IV as hex
    GenIv,

    /// Print a random key as hex
    GenKey {
        #[arg(short, long, value_enum, default_value_t = Bits::B256)]
        bits: Bits,
    },
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Key as hex: 16, 24 or 32 bytes
    #[arg(short, long)]
    key: String,

    /// IV as hex: 16 bytes
    #[arg(long)]
    iv: String,

    /// Read from this file instead of stdin
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bytes requested per read from the cipher stream
    #[arg(long, default_value_t = CHUNK_SIZE)]
    read_size: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Bits {
    #[value(name = "128")]
    B128,
    #[value(name = "192")]
    B192,
    #[value(name = "256")]
    B256,
}

impl Bits {
    fn key_size(self) -> KeySize {
        match self {
            Bits::B128 => KeySize::Aes128,
            Bits::B192 => KeySize::Aes192,
            Bits::B256 => KeySize::Aes256,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.operation {
        Commands::Encrypt(args) => run(&args, Direction::Encrypt),
        Commands::Decrypt(args) => run(&args, Direction::Decrypt),
        Commands::GenIv => println!("{}", hex::encode(crypto::generate_random_iv())),
        Commands::GenKey { bits } => {
            println!("{}", hex::encode(crypto::generate_random_key(bits.key_size())));
        }
    }
}

fn run(args: &StreamArgs, direction: Direction) {
    if args.read_size == 0 {
        eprintln!("--read-size must be at least 1");
        exit(1)
    }

    if !crypto::is_available() {
        eprintln!("AES engine is not available on this machine");
        exit(1)
    }

    let key = decode_hex("key", &args.key);
    let iv = decode_hex("IV", &args.iv);

    let input: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(File::open(path).unwrap_or_else(|err| {
            eprintln!("Couldn't open '{}': {err}", path.display());
            exit(1)
        })),
        None => Box::new(io::stdin().lock()),
    };

    let reader = match direction {
        Direction::Encrypt => crypto::encrypting_reader(input, &key, &iv),
        Direction::Decrypt => crypto::decrypting_reader(input, &key, &iv),
    }
    .unwrap_or_else(|err| {
        eprintln!("{err}");
        exit(1)
    });

    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path).unwrap_or_else(|err| {
            eprintln!("Couldn't create '{}': {err}", path.display());
            exit(1)
        })),
        None => Box::new(io::stdout().lock()),
    };
    let mut output = BufWriter::new(output);

    match copy_stream(reader, &mut output, args.read_size) {
        Ok(total) => log::info!("{direction:?}: wrote {total} bytes"),
        Err(err) => {
            eprintln!("{direction:?} failed: {err}");
            drop(output);
            if let Some(path) = &args.output {
                let _ = fs::remove_file(path);
            }
            exit(1)
        }
    }
}

/// Runs `reader` to the end with reads of `read_size` bytes, then destroys
/// the finalized engine and only then hands the result to `output`.
///
/// On failure `output` is left untouched, so unverified plaintext never
/// leaves the process.
fn copy_stream<R: Read>(
    mut reader: CipherReader<R, AesCbcEngine>,
    output: &mut impl Write,
    read_size: usize,
) -> io::Result<u64> {
    let mut staged = Vec::new();
    let mut buf = vec![0; read_size];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        staged.extend_from_slice(&buf[..n]);
    }

    let (_, mut engine) = reader.into_parts();
    engine
        .destroy()
        .map_err(|err| io::Error::new(ErrorKind::Other, err))?;

    output.write_all(&staged)?;
    output.flush()?;
    Ok(staged.len() as u64)
}

fn decode_hex(name: &str, value: &str) -> Vec<u8> {
    hex::decode(value.trim()).unwrap_or_else(|err| {
        eprintln!("Invalid {name} hex: {err}");
        exit(1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_stream_args() {
        let cli = Cli::parse_from([
            "conceal",
            "decrypt",
            "--key",
            "000102030405060708090a0b0c0d0e0f",
            "--iv",
            "0f0e0d0c0b0a09080706050403020100",
            "--read-size",
            "7",
        ]);
        let Commands::Decrypt(args) = cli.operation else {
            panic!("expected decrypt");
        };
        assert_eq!(args.read_size, 7);
        assert!(args.input.is_none());
        assert_eq!(decode_hex("key", &args.key).len(), 16);
    }

    #[test]
    fn copy_stream_round_trips() {
        let key = [3; 24];
        let iv = [4; 16];
        let plaintext: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();

        let mut ciphertext = Vec::new();
        let reader = crypto::encrypting_reader(&plaintext[..], &key, &iv).unwrap();
        copy_stream(reader, &mut ciphertext, 5).unwrap();

        let mut decrypted = Vec::new();
        let reader = crypto::decrypting_reader(&ciphertext[..], &key, &iv).unwrap();
        assert_eq!(copy_stream(reader, &mut decrypted, 4096).unwrap(), 3000);
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn copy_stream_rejects_tampering() {
        let key = [3; 16];
        let iv = [4; 16];
        let mut ciphertext = Vec::new();
        let reader = crypto::encrypting_reader(&b"attack at dawn"[..], &key, &iv).unwrap();
        copy_stream(reader, &mut ciphertext, 64).unwrap();
        ciphertext.truncate(ciphertext.len() - 1);

        let reader = crypto::decrypting_reader(&ciphertext[..], &key, &iv).unwrap();
        let err = copy_stream(reader, &mut Vec::new(), 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn tampered_input_writes_nothing() {
        let key = [7; 32];
        let iv = [8; 16];
        let mut ciphertext = Vec::new();
        let reader = crypto::encrypting_reader(&[b'A'; 64 * 1024][..], &key, &iv).unwrap();
        copy_stream(reader, &mut ciphertext, CHUNK_SIZE).unwrap();
        *ciphertext.last_mut().unwrap() ^= 1;

        let mut output = BufWriter::new(Vec::new());
        let reader = crypto::decrypting_reader(&ciphertext[..], &key, &iv).unwrap();
        let err = copy_stream(reader, &mut output, CHUNK_SIZE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(output.buffer().is_empty());
        assert!(output.get_ref().is_empty());
    }
}
