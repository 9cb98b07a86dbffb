macro_rules! pub_use{
    ($($name:ident),+) => { $(mod $name; pub use $name::*;)+ }
}

pub_use!(lookup, read, readdirplus);
