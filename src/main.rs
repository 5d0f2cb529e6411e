use spellscript::{Interpreter, StdHost};
use std::env;
use std::fs;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("usage: spellscript <filename>.spell");
        process::exit(1);
    }

    let source = match fs::read_to_string(&args[1]) {
        Ok(source) => source,
        Err(e) => {
            println!("the spell has backfired: {e}");
            process::exit(1);
        }
    };

    let mut interpreter = Interpreter::new(StdHost);
    if let Err(e) = interpreter.cast_spell(&source) {
        println!("the spell has backfired: {e}");
        process::exit(1);
    }
}
