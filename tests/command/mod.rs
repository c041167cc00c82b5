mod pattern_test;
