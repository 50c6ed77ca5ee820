mod common;
mod confirmation;
