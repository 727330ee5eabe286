fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Both services live here so the master and the worker compile
    // against the same generated stubs.
    tonic_build::compile_protos("../protos/master.proto")?;
    tonic_build::compile_protos("../protos/worker.proto")?;
    Ok(())
}
