use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // 获取项目根目录
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    // 确保data目录存在
    let processed_dir = Path::new(&manifest_dir).join("data").join("processed");
    if !processed_dir.exists() {
        fs::create_dir_all(&processed_dir).expect("Failed to create data directory");
    }

    // 检查原始CSV是否存在
    let raw_csv = Path::new(&manifest_dir).join("data").join("raw").join("stock_market.csv");
    if !raw_csv.exists() {
        println!("cargo:warning=data/raw/stock_market.csv not found. The pipeline has nothing to clean.");
        println!("cargo:warning=Place the raw CSV there, then run 'cargo run -- run'.");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
