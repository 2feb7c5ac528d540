mod replication_test;
