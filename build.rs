// build.rs

use std::fs;
use std::process::Command;

const SHADERS: &[(&str, &str)] = &[
    ("shaders/tri.vert", "assets/shaders/tri.vert.spv"),
    ("shaders/tri.frag", "assets/shaders/tri.frag.spv"),
];

fn main() {
    if let Err(err) = fs::create_dir_all("assets/shaders") {
        println!("cargo::warning=could not create assets/shaders: {}", err);
        return;
    }

    for (source, output) in SHADERS {
        match Command::new("glslc").args([source, "-o", output]).status() {
            Err(err) => {
                // The renderer reports the missing bytecode at startup.
                println!("cargo::warning=glslc unavailable, {} not compiled: {}", source, err);
            }
            Ok(status) if !status.success() => {
                panic!("glslc failed on {}: {}", source, status);
            }
            Ok(_) => {}
        }
        println!("cargo::rerun-if-changed={}", source);
    }
}
