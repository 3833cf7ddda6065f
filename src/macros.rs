macro_rules! variant {
    ($e:expr, $p:path) => {
        match $e {
            $p(n) => n,
            _ => unreachable!("node has an unexpected opcode"),
        }
    };
}
