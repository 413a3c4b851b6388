use racebin::Codec;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} <structure.xml> <data-file> [--count NAME=N]...",
            args[0]
        );
        process::exit(1);
    }

    let structure_path = &args[1];
    let data_path = &args[2];

    // Parse --count NAME=N overrides for repeaters without a count field
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut i = 3;
    while i < args.len() {
        if args[i] == "--count" {
            let Some(spec) = args.get(i + 1) else {
                eprintln!("ERROR: --count flag requires an argument.");
                process::exit(1);
            };
            let Some((name, n)) = spec.split_once('=') else {
                eprintln!("ERROR: Invalid count format. Expected NAME=N");
                process::exit(1);
            };
            let Ok(n) = n.parse::<usize>() else {
                eprintln!("ERROR: Invalid count value: {}", n);
                process::exit(1);
            };
            counts.insert(name.to_string(), n);
            i += 2;
        } else {
            eprintln!("ERROR: Unknown argument: {}", args[i]);
            process::exit(1);
        }
    }

    let data = match fs::read(data_path) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("ERROR: Failed to read {}: {}", data_path, e);
            process::exit(1);
        }
    };

    println!("Decoding {} against {}", data_path, structure_path);
    println!("{}", "=".repeat(60));

    let codec = Codec::new();
    match codec.decode_with_counts(structure_path, &data, &counts) {
        Ok(store) => {
            print!("{}", store);
            println!("{}", "=".repeat(60));
            println!("{} bytes, {} store entries", data.len(), store.len());
        }
        Err(e) => {
            eprintln!("\nERROR: Failed to decode {}", data_path);
            eprintln!("  {}", e);
            process::exit(1);
        }
    }
}
