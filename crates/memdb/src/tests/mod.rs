mod helpers;
mod segment_tests;
