/*
 * Copyright 2018 Bitwise IO, Inc.
 * Copyright 2020 Cargill Incorporated
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 * -----------------------------------------------------------------------------
 */

use std::env;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("protos");
    let proto_path = Path::new("./protos");
    fs::create_dir_all(&dest_path).unwrap();

    println!("cargo:rerun-if-changed=protos");

    protobuf_codegen_pure::Codegen::new()
        .out_dir(&dest_path)
        .inputs(&[
            proto_path.join("contract.proto"),
            proto_path.join("contract_shim.proto"),
        ])
        .include(proto_path)
        .run()
        .expect("Protoc Error");

    let mut mod_file = File::create(dest_path.join("mod.rs")).unwrap();
    mod_file
        .write_all(b"pub mod contract;\npub mod contract_shim;\n")
        .unwrap();
}
