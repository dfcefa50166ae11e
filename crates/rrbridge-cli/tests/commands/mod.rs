mod bridge_test;
mod serve_test;
