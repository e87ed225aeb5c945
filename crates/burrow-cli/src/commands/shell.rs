//! Shell command - interactive line-oriented GC simulator.
//!
//! Keeps a name-to-address table layered over the collector. The core never
//! sees names; after a collection the table is pruned with the freed-address
//! list the collector returns.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use burrow_gc::Collector;
use rustc_hash::FxHashMap;

pub fn run() -> Result<()> {
    println!(
        "burrow {} - interactive garbage collection simulator",
        env!("CARGO_PKG_VERSION")
    );
    print_help();

    let mut shell = Shell::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("\n> ");
        stdout.flush()?;

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }

        if !shell.handle_line(line.trim()) {
            break;
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        "\navailable commands:\n\
         \x20 alloc <name> <size>   - allocate an object\n\
         \x20 ref <from> [to]       - add an external (or nested, if <to> is given) reference\n\
         \x20 delref <name>         - delete an external reference\n\
         \x20 rc                    - run reference counting GC\n\
         \x20 ms                    - run mark-and-sweep GC\n\
         \x20 mem                   - show available memory\n\
         \x20 list                  - list tracked objects\n\
         \x20 help                  - show this help menu\n\
         \x20 exit                  - quit the simulator"
    );
}

struct Shell {
    gc: Collector,
    objects: FxHashMap<String, usize>,
}

impl Shell {
    fn new() -> Self {
        Self {
            gc: Collector::new(),
            objects: FxHashMap::default(),
        }
    }

    /// Execute one command line. Returns `false` when the shell should exit.
    fn handle_line(&mut self, line: &str) -> bool {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return true;
        };

        match command {
            "alloc" => self.cmd_alloc(parts.next(), parts.next()),
            "ref" => self.cmd_ref(parts.next(), parts.next()),
            "delref" => self.cmd_delref(parts.next()),
            "rc" => {
                let freed = self.gc.rc_collect();
                self.prune(&freed);
                println!("reference counting GC completed.");
            }
            "ms" => {
                let freed = self.gc.ms_collect();
                self.prune(&freed);
                println!("mark and sweep GC completed.");
            }
            "mem" => println!("available memory: {} bytes.", self.gc.available_memory()),
            "list" => {
                println!("tracked objects:");
                for (name, addr) in &self.objects {
                    println!("  {name}: {addr:#x}");
                }
            }
            "help" => print_help(),
            "exit" => {
                println!("exiting garbage collection simulator.");
                return false;
            }
            _ => println!("unknown command. try 'help'."),
        }
        true
    }

    fn cmd_alloc(&mut self, name: Option<&str>, size: Option<&str>) {
        let (Some(name), Some(size)) = (name, size) else {
            println!("usage: alloc <name> <size>");
            return;
        };
        let Ok(size) = size.parse::<usize>() else {
            println!("invalid size. usage: alloc <name> <size>");
            return;
        };
        if self.objects.contains_key(name) {
            println!("objects must have unique names.");
            return;
        }
        match self.gc.allocate(size) {
            Ok(addr) => {
                self.objects.insert(name.to_string(), addr);
                println!("allocated '{name}' with {size} bytes.");
            }
            Err(err) => println!("allocation failed: {err}"),
        }
    }

    fn cmd_ref(&mut self, from: Option<&str>, to: Option<&str>) {
        match (from, to) {
            (Some(from), None) => {
                let Some(&addr) = self.objects.get(from) else {
                    println!("unknown object: {from}");
                    return;
                };
                self.gc.add_reference(addr);
                println!("added external reference to '{from}'.");
            }
            (Some(from), Some(to)) => {
                let (Some(&src), Some(&dest)) = (self.objects.get(from), self.objects.get(to))
                else {
                    println!("unknown object names.");
                    return;
                };
                match self.gc.add_nested_reference(src, dest) {
                    Ok(()) => println!("added nested reference: {from} -> {to}"),
                    Err(err) => println!("{err}"),
                }
            }
            _ => println!("usage: ref <from> [to]"),
        }
    }

    fn cmd_delref(&mut self, name: Option<&str>) {
        let Some(name) = name else {
            println!("usage: delref <name>");
            return;
        };
        let Some(&addr) = self.objects.get(name) else {
            println!("unknown object: {name}");
            return;
        };
        self.gc.delete_reference(addr);
        println!("deleted external reference to '{name}'.");
    }

    /// Drop every name whose address was freed by a collection.
    fn prune(&mut self, freed: &[usize]) {
        self.objects.retain(|_, addr| !freed.contains(addr));
    }
}
