use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

//SPLITMAP_MAX_THREADS

fn main() {
    println!("cargo:rerun-if-env-changed=SPLITMAP_MAX_THREADS");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    let max_threads: usize = option_env!("SPLITMAP_MAX_THREADS")
        .map_or(Ok(64), str::parse)
        .expect("failed to parse env variable SPLITMAP_MAX_THREADS");

    if max_threads == 0 {
        panic!("invalid SPLITMAP_MAX_THREADS value (0)");
    }

    write!(&mut file, "const MAX_THREADS: usize = {};", max_threads)
        .expect("could not write to file");
}
